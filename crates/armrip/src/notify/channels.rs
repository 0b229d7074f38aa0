//! Push and webhook delivery channels.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::error::NotifyError;

pub const PUSHBULLET_URL: &str = "https://api.pushbullet.com/v2/pushes";
pub const IFTTT_URL: &str = "https://maker.ifttt.com/trigger";
pub const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";

/// One external delivery target.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

async fn post_json(
    channel: &'static str,
    request: reqwest::RequestBuilder,
    payload: serde_json::Value,
) -> Result<(), NotifyError> {
    let response = request
        .json(&payload)
        .send()
        .await
        .map_err(|e| NotifyError::Http { channel, source: e })?;
    if !response.status().is_success() {
        return Err(NotifyError::Status {
            channel,
            status: response.status().as_u16(),
        });
    }
    Ok(())
}

pub struct Pushbullet {
    client: Client,
    token: SecretString,
}

impl Pushbullet {
    pub fn new(client: Client, token: SecretString) -> Self {
        Self { client, token }
    }
}

#[async_trait]
impl NotificationChannel for Pushbullet {
    fn name(&self) -> &'static str {
        "Pushbullet"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let request = self
            .client
            .post(PUSHBULLET_URL)
            .header("Access-Token", self.token.expose_secret());
        post_json(
            self.name(),
            request,
            json!({"type": "note", "title": title, "body": body}),
        )
        .await
    }
}

pub struct Ifttt {
    client: Client,
    key: SecretString,
    event: String,
}

impl Ifttt {
    pub fn new(client: Client, key: SecretString, event: impl Into<String>) -> Self {
        Self {
            client,
            key,
            event: event.into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for Ifttt {
    fn name(&self) -> &'static str {
        "IFTTT"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let url = format!(
            "{}/{}/with/key/{}",
            IFTTT_URL,
            self.event,
            self.key.expose_secret()
        );
        post_json(
            self.name(),
            self.client.post(url),
            json!({"value1": title, "value2": body}),
        )
        .await
    }
}

pub struct Pushover {
    client: Client,
    user_key: SecretString,
    app_key: SecretString,
}

impl Pushover {
    pub fn new(client: Client, user_key: SecretString, app_key: SecretString) -> Self {
        Self {
            client,
            user_key,
            app_key,
        }
    }
}

#[async_trait]
impl NotificationChannel for Pushover {
    fn name(&self) -> &'static str {
        "Pushover"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        post_json(
            self.name(),
            self.client.post(PUSHOVER_URL),
            json!({
                "token": self.app_key.expose_secret(),
                "user": self.user_key.expose_secret(),
                "title": title,
                "message": body,
            }),
        )
        .await
    }
}

/// Generic HTTP callback: `POST {"title", "body"}`.
pub struct JsonWebhook {
    client: Client,
    url: String,
}

impl JsonWebhook {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for JsonWebhook {
    fn name(&self) -> &'static str {
        "JSON webhook"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        post_json(
            self.name(),
            self.client.post(&self.url),
            json!({"title": title, "body": body}),
        )
        .await
    }
}
