//! Prompt hygiene and reply parsing for chat completions.

use serde::de::DeserializeOwned;

/// Escapes chat-template control tokens in text embedded into a prompt.
///
/// Disc labels and tool output are attacker-influenced; a label containing
/// `<|im_start|>system` must not open a new turn.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|", "< |")
        .replace("|>", "| >")
        .replace("<s>", "< s >")
        .replace("</s>", "< / s >")
        .replace("[INST]", "[ INST ]")
        .replace("[/INST]", "[ / INST ]")
        .replace("<<SYS>>", "< < SYS > >")
        .replace("<</SYS>>", "< < / SYS > >")
        .replace('"', "'")
}

/// Unwraps a reply fenced as a whole in ```` ``` ```` or ```` ```json ````.
fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening fence line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Decodes a model reply into `T`. The reply must be the JSON object alone,
/// optionally fenced; prose around it yields `None`.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Option<T> {
    serde_json::from_str(strip_fences(reply)).ok()
}
