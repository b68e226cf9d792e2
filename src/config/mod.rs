//! Configuration Management Module
//!
//! Persistent monitor settings and their on-disk storage.

pub mod storage;
pub mod types;

pub use storage::{config_dir, config_file, ConfigStorage, StorageError};
pub use types::{
    MonitorConfig, BAUD_RATES, CONFIG_VERSION, DEFAULT_BAUD_RATE, MAX_READ_TIMEOUT,
    MIN_RESET_SETTLE,
};
