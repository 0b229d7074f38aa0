//! Shared HTTP client construction for providers, the AI endpoint and
//! notification channels.

use std::time::Duration;

use reqwest::Client;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout. AI completions use the same 30s budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length for error bodies copied into errors and log lines.
const MAX_ERROR_BODY_LENGTH: usize = 200;

pub fn create_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!(
            "armrip/",
            env!("CARGO_PKG_VERSION"),
            " ( https://github.com/automatic-ripping-machine/automatic-ripping-machine )"
        ))
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
}

/// Truncates a response body so provider echoes of request data stay out of logs.
pub fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}
