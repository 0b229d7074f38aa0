use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::job::DiscType;

/// How the video extraction step reads the disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RipMethod {
    /// `makemkvcon mkv`: remux titles straight to MKV.
    #[default]
    Mkv,
    /// `makemkvcon backup --decrypt`: full decrypted disc backup.
    Backup,
    /// Same as `backup`, kept for configs written for DVD-only drives.
    BackupDvd,
    /// No extraction tool; HandBrake reads the device.
    Direct,
}

impl RipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RipMethod::Mkv => "mkv",
            RipMethod::Backup => "backup",
            RipMethod::BackupDvd => "backup_dvd",
            RipMethod::Direct => "direct",
        }
    }

    pub fn is_backup(&self) -> bool {
        matches!(self, RipMethod::Backup | RipMethod::BackupDvd)
    }
}

/// Operator configuration, read from `arm.yaml`. Keys are upper-case in the
/// file (`RIPMETHOD`, `RAW_PATH`, ...). Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    #[serde(default)]
    pub skip_transcode: bool,
    #[serde(default)]
    pub ripmethod: RipMethod,
    /// Only rip/transcode the main feature instead of every title.
    #[serde(default)]
    pub mainfeature: bool,
    #[serde(default = "default_minlength")]
    pub minlength: u64,
    #[serde(default = "default_maxlength")]
    pub maxlength: u64,

    #[serde(default = "default_raw_path")]
    pub raw_path: PathBuf,
    #[serde(default = "default_transcode_path")]
    pub transcode_path: PathBuf,
    #[serde(default = "default_completed_path")]
    pub completed_path: PathBuf,
    #[serde(default = "default_logpath")]
    pub logpath: PathBuf,

    #[serde(default)]
    pub hb_preset_dvd: String,
    #[serde(default)]
    pub hb_preset_bd: String,
    #[serde(default)]
    pub hb_args_dvd: String,
    #[serde(default)]
    pub hb_args_bd: String,
    #[serde(default = "default_dest_ext")]
    pub dest_ext: String,

    #[serde(default)]
    pub use_ffmpeg: bool,
    #[serde(default)]
    pub ffmpeg_args_dvd: String,
    #[serde(default)]
    pub ffmpeg_args_bd: String,
    #[serde(default)]
    pub ffmpeg_pre_args_dvd: String,
    #[serde(default)]
    pub ffmpeg_pre_args_bd: String,
    #[serde(default = "default_max_concurrent_transcodes")]
    pub max_concurrent_transcodes: usize,

    #[serde(default)]
    pub emby_refresh: bool,
    #[serde(default)]
    pub emby_server: String,
    #[serde(default = "default_emby_port")]
    pub emby_port: u16,
    #[serde(default)]
    pub emby_api_key: Option<String>,

    #[serde(default)]
    pub pb_key: Option<String>,
    #[serde(default)]
    pub ifttt_key: Option<String>,
    #[serde(default)]
    pub ifttt_event: Option<String>,
    #[serde(default)]
    pub po_user_key: Option<String>,
    #[serde(default)]
    pub po_app_key: Option<String>,
    #[serde(default)]
    pub json_url: Option<String>,

    #[serde(default)]
    pub omdb_api_key: Option<String>,
    #[serde(default)]
    pub omdb_api_key_file: Option<String>,
    #[serde(default)]
    pub tmdb_api_key: Option<String>,
    #[serde(default)]
    pub tmdb_api_key_file: Option<String>,

    #[serde(default)]
    pub ai_api_key: Option<String>,
    #[serde(default)]
    pub ai_api_key_file: Option<String>,
    #[serde(default)]
    pub ai_api_url: Option<String>,
    #[serde(default)]
    pub ai_model: Option<String>,

    /// Seconds to wait for another job's lock on a destination directory.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: u64,
}

fn default_minlength() -> u64 {
    600
}

fn default_maxlength() -> u64 {
    99999
}

fn default_raw_path() -> PathBuf {
    PathBuf::from("/home/arm/raw")
}

fn default_transcode_path() -> PathBuf {
    PathBuf::from("/home/arm/transcode")
}

fn default_completed_path() -> PathBuf {
    PathBuf::from("/home/arm/media/completed")
}

fn default_logpath() -> PathBuf {
    PathBuf::from("/home/arm/logs")
}

fn default_dest_ext() -> String {
    "mkv".to_string()
}

fn default_max_concurrent_transcodes() -> usize {
    1
}

fn default_emby_port() -> u16 {
    8096
}

fn default_lock_timeout() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_transcode: false,
            ripmethod: RipMethod::default(),
            mainfeature: false,
            minlength: default_minlength(),
            maxlength: default_maxlength(),
            raw_path: default_raw_path(),
            transcode_path: default_transcode_path(),
            completed_path: default_completed_path(),
            logpath: default_logpath(),
            hb_preset_dvd: String::new(),
            hb_preset_bd: String::new(),
            hb_args_dvd: String::new(),
            hb_args_bd: String::new(),
            dest_ext: default_dest_ext(),
            use_ffmpeg: false,
            ffmpeg_args_dvd: String::new(),
            ffmpeg_args_bd: String::new(),
            ffmpeg_pre_args_dvd: String::new(),
            ffmpeg_pre_args_bd: String::new(),
            max_concurrent_transcodes: default_max_concurrent_transcodes(),
            emby_refresh: false,
            emby_server: String::new(),
            emby_port: default_emby_port(),
            emby_api_key: None,
            pb_key: None,
            ifttt_key: None,
            ifttt_event: None,
            po_user_key: None,
            po_app_key: None,
            json_url: None,
            omdb_api_key: None,
            omdb_api_key_file: None,
            tmdb_api_key: None,
            tmdb_api_key_file: None,
            ai_api_key: None,
            ai_api_key_file: None,
            ai_api_url: None,
            ai_model: None,
            lock_timeout: default_lock_timeout(),
        }
    }
}

/// Transcoder settings picked for one disc type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSettings {
    pub preset: String,
    pub args: String,
    pub pre_args: String,
    pub ext: String,
}

impl Config {
    /// DVD and Blu-ray carry separate presets and argument sets.
    pub fn transcode_settings(&self, disctype: DiscType) -> TranscodeSettings {
        let bluray = disctype == DiscType::Bluray;
        if self.use_ffmpeg {
            TranscodeSettings {
                preset: String::new(),
                args: pick(bluray, &self.ffmpeg_args_bd, &self.ffmpeg_args_dvd),
                pre_args: pick(bluray, &self.ffmpeg_pre_args_bd, &self.ffmpeg_pre_args_dvd),
                ext: self.dest_ext.clone(),
            }
        } else {
            TranscodeSettings {
                preset: pick(bluray, &self.hb_preset_bd, &self.hb_preset_dvd),
                args: pick(bluray, &self.hb_args_bd, &self.hb_args_dvd),
                pre_args: String::new(),
                ext: self.dest_ext.clone(),
            }
        }
    }
}

fn pick(bluray: bool, bd: &str, dvd: &str) -> String {
    if bluray { bd } else { dvd }.to_string()
}
