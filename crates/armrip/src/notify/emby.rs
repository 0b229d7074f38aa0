//! Emby library rescan after new files land.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::config::Config;
use crate::error::NotifyError;
use crate::http::{create_http_client, DEFAULT_REQUEST_TIMEOUT};
use crate::sanitize::redact_query_secrets;

pub struct EmbyRefresh {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl EmbyRefresh {
    /// `None` unless `EMBY_REFRESH` is on with a server and key.
    pub fn from_config(config: &Config) -> Option<Result<Self, reqwest::Error>> {
        if !config.emby_refresh || config.emby_server.is_empty() {
            return None;
        }
        let api_key = config.emby_api_key.as_deref().filter(|k| !k.is_empty())?;
        Some(create_http_client(DEFAULT_REQUEST_TIMEOUT).map(|client| Self {
            client,
            base_url: base_url(&config.emby_server, config.emby_port),
            api_key: SecretString::from(api_key.to_string()),
        }))
    }

    pub fn refresh_url(&self) -> String {
        format!(
            "{}/Library/Refresh?api_key={}",
            self.base_url,
            self.api_key.expose_secret()
        )
    }

    pub async fn refresh(&self) -> Result<(), NotifyError> {
        let url = self.refresh_url();
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| NotifyError::Http {
                channel: "Emby",
                source: e,
            })?;
        if !response.status().is_success() {
            return Err(NotifyError::Status {
                channel: "Emby",
                status: response.status().as_u16(),
            });
        }
        info!(url = %redact_query_secrets(&url), "Emby library scan triggered");
        Ok(())
    }
}

/// Accepts a bare host (`emby.lan`) or a full URL (`https://emby.lan`).
fn base_url(server: &str, port: u16) -> String {
    let server = server.trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        let host_part = server.split_once("://").map(|(_, rest)| rest).unwrap_or(server);
        if host_part.contains(':') {
            server.to_string()
        } else {
            format!("{}:{}", server, port)
        }
    } else {
        format!("http://{}:{}", server, port)
    }
}
