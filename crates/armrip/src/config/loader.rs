use std::path::Path;

use crate::config::schema::{Config, RipMethod};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub const DEFAULT_CONFIG_PATH: &str = "/etc/arm/config/arm.yaml";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let mut value: serde_json::Value = serde_yaml::from_str(content)?;
    // An empty file parses as null; treat it as "all defaults".
    if value.is_null() {
        value = serde_json::Value::Object(serde_json::Map::new());
    }

    validate_schema(&value)?;

    let config: Config = serde_json::from_value(value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.max_concurrent_transcodes < 1 {
        return Err(ConfigError::Validation {
            message: "MAX_CONCURRENT_TRANSCODES must be at least 1".to_string(),
        });
    }

    if config.minlength > config.maxlength {
        return Err(ConfigError::Validation {
            message: format!(
                "MINLENGTH ({}) is greater than MAXLENGTH ({})",
                config.minlength, config.maxlength
            ),
        });
    }

    // Without an extraction step HandBrake is the only thing that reads the disc.
    if config.ripmethod == RipMethod::Direct {
        if config.skip_transcode {
            return Err(ConfigError::Validation {
                message: "RIPMETHOD 'direct' cannot be combined with SKIP_TRANSCODE".to_string(),
            });
        }
        if config.use_ffmpeg {
            return Err(ConfigError::Validation {
                message: "RIPMETHOD 'direct' requires HandBrake (USE_FFMPEG must be false)"
                    .to_string(),
            });
        }
    }

    // FFmpeg takes a single input file; backup folders need HandBrake's title scan.
    if config.ripmethod.is_backup() && config.use_ffmpeg {
        return Err(ConfigError::Validation {
            message: format!(
                "RIPMETHOD '{}' requires HandBrake (USE_FFMPEG must be false)",
                config.ripmethod.as_str()
            ),
        });
    }

    if config.dest_ext.is_empty()
        || config
            .dest_ext
            .chars()
            .any(|c| c == '.' || c == '/' || c == '\\')
    {
        return Err(ConfigError::Validation {
            message: format!("Invalid DEST_EXT '{}'", config.dest_ext),
        });
    }

    if config.emby_refresh
        && (config.emby_server.is_empty()
            || config.emby_api_key.as_deref().unwrap_or("").is_empty())
    {
        return Err(ConfigError::Validation {
            message: "EMBY_REFRESH requires EMBY_SERVER and EMBY_API_KEY".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_valid_config() {
        let yaml = r#"
RIPMETHOD: backup
SKIP_TRANSCODE: false
RAW_PATH: /srv/arm/raw
COMPLETED_PATH: /srv/media
HB_PRESET_DVD: "HQ 720p30 Surround"
MAX_CONCURRENT_TRANSCODES: 2
ARM_NAME: "living room"
"#;

        let config = load_config_from_str(yaml).unwrap();
        assert_eq!(config.ripmethod, RipMethod::Backup);
        assert_eq!(config.raw_path, PathBuf::from("/srv/arm/raw"));
        assert_eq!(config.completed_path, PathBuf::from("/srv/media"));
        assert_eq!(config.hb_preset_dvd, "HQ 720p30 Surround");
        assert_eq!(config.max_concurrent_transcodes, 2);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_null_values_accepted_for_optional_keys() {
        let config = load_config_from_str("PB_KEY:\nJSON_URL: ~\n").unwrap();
        assert!(config.pb_key.is_none());
        assert!(config.json_url.is_none());
    }

    #[test]
    fn test_unknown_rip_method_rejected_by_schema() {
        let result = load_config_from_str("RIPMETHOD: dd\n");
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_zero_concurrency_rejected_by_schema() {
        let result = load_config_from_str("MAX_CONCURRENT_TRANSCODES: 0\n");
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_wrong_type_rejected_by_schema() {
        let result = load_config_from_str("MINLENGTH: \"ten minutes\"\n");
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_direct_with_skip_transcode_rejected() {
        let result = load_config_from_str("RIPMETHOD: direct\nSKIP_TRANSCODE: true\n");
        match result {
            Err(ConfigError::Validation { message }) => {
                assert!(message.contains("SKIP_TRANSCODE"));
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_direct_with_ffmpeg_rejected() {
        let result = load_config_from_str("RIPMETHOD: direct\nUSE_FFMPEG: true\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_backup_with_ffmpeg_rejected() {
        for method in ["backup", "backup_dvd"] {
            let yaml = format!("RIPMETHOD: {}\nUSE_FFMPEG: true\n", method);
            match load_config_from_str(&yaml) {
                Err(ConfigError::Validation { message }) => {
                    assert!(message.contains("USE_FFMPEG"), "{}", message);
                }
                other => panic!("Expected Validation error for {}, got {:?}", method, other),
            }
        }
        assert!(load_config_from_str("RIPMETHOD: mkv\nUSE_FFMPEG: true\n").is_ok());
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let result = load_config_from_str("MINLENGTH: 5000\nMAXLENGTH: 100\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_dest_ext_with_dot_rejected() {
        let result = load_config_from_str("DEST_EXT: .mkv\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_emby_refresh_requires_server() {
        let result = load_config_from_str("EMBY_REFRESH: true\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = load_config_from_str("RIPMETHOD: [unterminated");
        assert!(matches!(result, Err(ConfigError::ParseYaml(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/arm.yaml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arm.yaml");
        std::fs::write(&path, "MAINFEATURE: true\nMINLENGTH: 1200\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.mainfeature);
        assert_eq!(config.minlength, 1200);
    }
}
