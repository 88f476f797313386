pub mod config;
pub mod error;
pub mod http;
pub mod kml;
pub mod scheduler;
pub mod source;
pub mod status;
pub mod store;

pub use config::Config;
pub use error::{ConfigError, FetchError, RefreshError, StoreError};
pub use kml::{DocumentBuilder, GeoDocument, Placemark};
pub use scheduler::{CycleReport, CycleState, Refresher};
pub use source::{HttpNodeSource, NodeRecord, NodeSource};
pub use status::{classify, DisplayStatus};
pub use store::{DocumentStore, Snapshot};
