pub mod config;
pub mod error;
pub mod logging;
pub mod partition;
pub mod traits;
pub mod types;

pub use config::{ConfigManager, FailureMode, LoggingConfig, ScanConfig, Settings, StoreConfig};
pub use error::*;
pub use logging::init_tracing;
pub use partition::*;
pub use traits::*;
pub use types::*;
