pub mod loader;
pub mod schema;
pub mod snapshot;

pub use loader::{load_config, load_config_from_str, DEFAULT_CONFIG_PATH};
pub use schema::{Config, RipMethod, TranscodeSettings};
pub use snapshot::ConfigSnapshot;
