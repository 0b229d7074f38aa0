//! Helpers for sanitizing data before it enters log lines and span fields.
//!
//! Job logs are attached to bug reports, so provider keys embedded in request
//! URLs and full library paths are stripped first.

use std::path::Path;

const SECRET_QUERY_KEYS: &[&str] = &["api_key", "apikey", "key", "token", "access_token"];

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks credential values in a URL.
///
/// - `http://emby:8096/Library/Refresh?api_key=abc` → `http://emby:8096/Library/Refresh?api_key=****`
/// - `https://maker.ifttt.com/trigger/rip/with/key/abc` → `https://maker.ifttt.com/trigger/rip/with/key/****`
/// - `http://www.omdbapi.com/?t=Alien&y=1979` → unchanged
pub fn redact_query_secrets(url: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (url, None),
    };

    let base = match base.find("/key/") {
        Some(pos) => {
            let after = &base[pos + 5..];
            let rest = after.find('/').map(|i| &after[i..]).unwrap_or("");
            format!("{}/key/****{}", &base[..pos], rest)
        }
        None => base.to_string(),
    };

    let Some(query) = query else {
        return base;
    };

    let redacted: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, _)) if SECRET_QUERY_KEYS.contains(&k.to_ascii_lowercase().as_str()) => {
                format!("{}=****", k)
            }
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", base, redacted.join("&"))
}
