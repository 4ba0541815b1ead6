//! Configuration for Lumen clients.
//!
//! Settings are layered the same way for every front end: an optional
//! `lumen.toml` (or JSON) file, then `LUMEN_*` environment variables, which
//! win over the file. A `.env` file next to the working directory is read
//! first when present.

pub mod loader;
pub mod models;
pub mod sources;
pub mod util;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    ClientConfig, ClientIdentity, ConfigMetadata, NetworkConfig, StorageConfig,
};
pub use sources::{EnvConfig, FileConfig};
