pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod http;
pub mod identify;
pub mod job;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod tools;

pub use ai::{AiAgent, CompletionClient, HttpCompletionClient};
pub use config::{load_config, Config, ConfigSnapshot, RipMethod};
pub use db::{Database, DatabaseError};
pub use error::{ArmError, ConfigError, MountError, Result, StorageError, ToolError};
pub use identify::IdentificationResolver;
pub use job::{DiscType, Identification, Job, JobEvent, JobStatus, Track};
pub use notify::NotificationDispatcher;
pub use pipeline::{Pipeline, PipelineContext, PipelineError};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use tools::{ToolInvoker, ToolRunner};
