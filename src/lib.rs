pub mod adapters;
pub mod cli;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

// Make test_support available for integration tests
pub mod test_support;

pub use adapters::{AdapterRegistry, DatabaseAdapter};
pub use domain::{Container, ContainerRuntime, ContainerSpec, ContainerStatus, DisplayStatus};
pub use error::{Error, Result};
pub use infra::{PodmanAdapter, Store};
pub use services::{Context, ExpirationEngine, Inventory, Orchestrator, UserService};
