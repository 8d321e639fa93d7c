pub mod config;
pub mod file_backend;
pub mod monitor;
pub mod paths;
pub mod util;

pub use config::{ConfigError, SchemeSetting, StorageConfig, CONFIG_VERSION};
pub use file_backend::FileBackend;
pub use monitor::{MonitorError, StorageMonitor};
pub use paths::PathRoots;
pub use util::write_atomic;
