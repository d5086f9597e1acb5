pub mod config;
pub mod podman_adapter;
pub mod store;

pub use config::{DataPaths, LastSettings, MkdbConfig};
pub use podman_adapter::PodmanAdapter;
pub use store::Store;
