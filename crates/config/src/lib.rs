//! Bridge configuration: serde schema with defaults, overridden from the
//! environment (`WCF_HOST`, `ONEBOT_PORT`, `STORAGE_PATH`, ...).

pub mod schema;

pub use schema::{BridgeConfig, ListenConfig, SourceConfig, StorageConfig, TargetConfig};
