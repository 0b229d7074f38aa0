use serde_json::{Map, Value};

use crate::config::schema::Config;
use crate::error::ConfigError;

/// Columns of the `config` table, in table order.
pub const SNAPSHOT_COLUMNS: &[&str] = &[
    "SKIP_TRANSCODE",
    "RIPMETHOD",
    "MAINFEATURE",
    "MINLENGTH",
    "MAXLENGTH",
    "RAW_PATH",
    "TRANSCODE_PATH",
    "COMPLETED_PATH",
    "LOGPATH",
    "HB_PRESET_DVD",
    "HB_PRESET_BD",
    "HB_ARGS_DVD",
    "HB_ARGS_BD",
    "DEST_EXT",
    "EMBY_SERVER",
    "EMBY_PORT",
    "EMBY_API_KEY",
    "EMBY_REFRESH",
    "PB_KEY",
    "IFTTT_KEY",
    "IFTTT_EVENT",
    "PO_USER_KEY",
    "PO_APP_KEY",
    "JSON_URL",
    "OMDB_API_KEY",
    "TMDB_API_KEY",
    "USE_FFMPEG",
    "FFMPEG_ARGS_DVD",
    "FFMPEG_ARGS_BD",
    "FFMPEG_PRE_ARGS_DVD",
    "FFMPEG_PRE_ARGS_BD",
    "MAX_CONCURRENT_TRANSCODES",
];

/// Credential columns. Stored as a fixed mask when set.
const MASKED_COLUMNS: &[&str] = &[
    "EMBY_API_KEY",
    "PB_KEY",
    "IFTTT_KEY",
    "PO_USER_KEY",
    "PO_APP_KEY",
    "OMDB_API_KEY",
    "TMDB_API_KEY",
];

pub const MASK: &str = "********";

/// The persisted copy of the configuration a job ran with. Written once.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub config_id: i64,
    pub values: Map<String, Value>,
}

impl ConfigSnapshot {
    pub fn capture(config: &Config) -> Result<Self, ConfigError> {
        let Value::Object(all) = serde_json::to_value(config)? else {
            return Err(ConfigError::Validation {
                message: "Config did not serialize to an object".to_string(),
            });
        };

        let values = SNAPSHOT_COLUMNS
            .iter()
            .map(|column| {
                let value = all.get(*column).cloned().unwrap_or(Value::Null);
                let value = match value {
                    Value::String(s) if !s.is_empty() && MASKED_COLUMNS.contains(column) => {
                        Value::String(MASK.to_string())
                    }
                    other => other,
                };
                (column.to_string(), value)
            })
            .collect();

        Ok(Self {
            config_id: 0,
            values,
        })
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }
}
