use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop the process before a job can run.
#[derive(Error, Debug)]
pub enum ArmError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Another armrip process (pid {pid}) is already handling '{devpath}'")]
    DuplicateRun { devpath: String, pid: u32 },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("AI client error: {0}")]
    Ai(#[from] AiError),

    #[error(transparent)]
    Transition(#[from] crate::job::TransitionError),

    #[error("Failed to set up logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Failed to convert config document: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Missing required credential '{name}': {reason}")]
    MissingCredential { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {}: {stderr}", describe_exit(.code))]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("'{program}' produced more than {limit} bytes of output")]
    OutputLimitExceeded { program: String, limit: usize },

    #[error("'{program}' did not finish within {seconds}s")]
    Timeout { program: String, seconds: u64 },
}

#[derive(Error, Debug)]
pub enum MountError {
    #[error("Failed to read mount table '{path}': {source}")]
    ReadMountTable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create mountpoint '{path}': {source}")]
    CreateMountpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to mount '{devpath}': {source}")]
    Mount {
        devpath: String,
        #[source]
        source: ToolError,
    },
}

/// Metadata provider and disc probing failures. Always recovered by the caller.
#[derive(Error, Debug)]
pub enum IdentifyError {
    #[error("{provider} request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Failed to read disc metadata '{path}': {reason}")]
    DiscMetadata { path: PathBuf, reason: String },

    #[error("Disc inspection failed: {0}")]
    Tool(#[from] ToolError),
}

#[derive(Error, Debug)]
pub enum AiError {
    #[error("Completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Completion endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Completion response contained no message")]
    EmptyResponse,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set permissions on '{path}': {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to take destination lock '{path}': {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {waited_secs}s waiting for destination lock '{path}'")]
    LockTimeout { path: PathBuf, waited_secs: u64 },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("{channel} delivery failed: {source}")]
    Http {
        channel: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{channel} returned HTTP {status}")]
    Status { channel: &'static str, status: u16 },

    #[error("Failed to record notification: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {}", c),
        None => "a signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ArmError>;
