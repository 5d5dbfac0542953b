pub mod config;
pub mod config_loader;
pub mod retry;
pub mod validation;

pub use config::{ApiConfig, AppConfig, MapConfig, ScanConfig, StorageConfig};
pub use config_loader::ConfigLoader;
pub use retry::{retry, RetryPolicy};
pub use validation::{DataValidator, ValidationReport};
