//! Completion notifications.
//!
//! Every notification is recorded in the `notifications` table first, then
//! offered to each configured channel. A failing channel is logged and the
//! next one still runs; nothing here fails the job.

pub mod channels;
pub mod emby;

use secrecy::SecretString;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{notification_repo, Database};
use crate::http::{create_http_client, DEFAULT_REQUEST_TIMEOUT};
use crate::job::Job;

pub use channels::{Ifttt, JsonWebhook, NotificationChannel, Pushbullet, Pushover};
pub use emby::EmbyRefresh;

/// What happened to one `notify` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub notification_id: Option<i64>,
    pub delivered: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

pub struct NotificationDispatcher {
    db: Database,
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Channels for every endpoint set in the config.
    pub fn from_config(db: Database, config: &Config) -> Result<Self, reqwest::Error> {
        let mut dispatcher = Self::new(db);
        let set = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        let has_any = set(&config.pb_key).is_some()
            || set(&config.ifttt_key).is_some()
            || set(&config.po_user_key).is_some()
            || set(&config.json_url).is_some();
        if !has_any {
            return Ok(dispatcher);
        }
        let client = create_http_client(DEFAULT_REQUEST_TIMEOUT)?;

        if let Some(token) = set(&config.pb_key) {
            dispatcher = dispatcher.with_channel(Box::new(Pushbullet::new(
                client.clone(),
                SecretString::from(token),
            )));
        }
        if let (Some(key), Some(event)) = (set(&config.ifttt_key), set(&config.ifttt_event)) {
            dispatcher = dispatcher.with_channel(Box::new(Ifttt::new(
                client.clone(),
                SecretString::from(key),
                event,
            )));
        }
        if let (Some(user), Some(app)) = (set(&config.po_user_key), set(&config.po_app_key)) {
            dispatcher = dispatcher.with_channel(Box::new(Pushover::new(
                client.clone(),
                SecretString::from(user),
                SecretString::from(app),
            )));
        }
        if let Some(url) = set(&config.json_url) {
            dispatcher = dispatcher.with_channel(Box::new(JsonWebhook::new(client, url)));
        }
        Ok(dispatcher)
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub async fn notify(&self, job: &Job, title: &str, body: &str) -> Delivery {
        let mut delivery = Delivery::default();

        match notification_repo::insert(&self.db, title, body) {
            Ok(id) => delivery.notification_id = Some(id),
            Err(e) => warn!(job_id = job.job_id, error = %e, "Failed to record notification"),
        }

        for channel in &self.channels {
            match channel.send(title, body).await {
                Ok(()) => delivery.delivered.push(channel.name()),
                Err(e) => {
                    warn!(
                        job_id = job.job_id,
                        channel = channel.name(),
                        error = %e,
                        "Notification delivery failed"
                    );
                    delivery.failed.push(channel.name());
                }
            }
        }

        info!(
            job_id = job.job_id,
            delivered = delivery.delivered.len(),
            failed = delivery.failed.len(),
            "Notification sent"
        );
        delivery
    }
}

/// Title and body announcing how a job ended.
pub fn completion_message(job: &Job) -> (String, String) {
    let title = job
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or("Unknown");
    let headline = if job.has_errors() {
        format!("ARM: {} completed with errors", title)
    } else {
        format!("ARM: {} completed successfully", title)
    };
    let body = format!(
        "Disc: {}\nType: {}\nStatus: {}",
        title,
        job.disctype,
        job.status()
    );
    (headline, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::job::{DiscType, JobEvent};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        fail: bool,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationChannel for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, title: &str, _body: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(format!("{}:{}", self.name, title));
            if self.fail {
                Err(NotifyError::Status {
                    channel: self.name,
                    status: 500,
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let db = Database::open_in_memory().unwrap();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = NotificationDispatcher::new(db.clone())
            .with_channel(Box::new(Recording { name: "a", fail: true, sent: sent.clone() }))
            .with_channel(Box::new(Recording { name: "b", fail: false, sent: sent.clone() }));

        let delivery = dispatcher.notify(&Job::new("/dev/sr0"), "Done", "body").await;

        assert!(delivery.notification_id.is_some());
        assert_eq!(delivery.failed, vec!["a"]);
        assert_eq!(delivery.delivered, vec!["b"]);
        assert_eq!(sent.lock().unwrap().len(), 2);

        let stored = notification_repo::find_unseen(&db).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Done");
    }

    #[test]
    fn test_from_config_builds_configured_channels() {
        let db = Database::open_in_memory().unwrap();
        let config = Config {
            pb_key: Some("o.abc".to_string()),
            ifttt_key: Some("key".to_string()),
            ifttt_event: None,
            po_user_key: Some("u".to_string()),
            po_app_key: Some("a".to_string()),
            json_url: Some("http://hooks.lan/arm".to_string()),
            ..Default::default()
        };
        let dispatcher = NotificationDispatcher::from_config(db.clone(), &config).unwrap();
        assert_eq!(
            dispatcher.channel_names(),
            vec!["Pushbullet", "Pushover", "JSON webhook"]
        );

        let none = NotificationDispatcher::from_config(db, &Config::default()).unwrap();
        assert!(none.channel_names().is_empty());
    }

    #[test]
    fn test_completion_message() {
        let mut job = Job::new("/dev/sr0");
        job.apply(JobEvent::Start).unwrap();
        job.disctype = DiscType::Dvd;
        job.apply(JobEvent::Abort).unwrap();

        let (title, body) = completion_message(&job);
        assert_eq!(title, "ARM: Unknown completed successfully");
        assert_eq!(body, "Disc: Unknown\nType: dvd\nStatus: fail");

        job.append_error("Unknown disc type");
        let (title, _) = completion_message(&job);
        assert_eq!(title, "ARM: Unknown completed with errors");
    }
}
