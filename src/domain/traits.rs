use anyhow::Result;
use std::fmt::Debug;
use std::time::Duration;

/// Everything needed to create one runtime container.
#[derive(Debug, Clone)]
pub struct ContainerSpec<'a> {
    pub name: &'a str,
    pub image: &'a str,
    /// `host:container` port bindings.
    pub ports: &'a [String],
    pub env: &'a [String],
    /// `source:target` bind mounts.
    pub volumes: &'a [String],
    /// `key=value` labels.
    pub labels: &'a [String],
    /// Overrides the image command when non-empty.
    pub command: &'a [String],
    pub restart_policy: Option<&'a str>,
}

/// Trait for container runtime operations
///
/// Calls block until the runtime answers and are never retried here; callers
/// decide whether a failure is fatal.
pub trait ContainerRuntime: Send + Sync + Debug {
    /// Pull an image, skipping the download when it is already present
    fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container from a spec, returning its runtime id
    fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a container
    fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a container, waiting up to `timeout` before killing it
    fn stop_container(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Remove a container (forced)
    fn remove_container(&self, id: &str) -> Result<()>;

    /// Restart a container in place
    fn restart_container(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Check whether the runtime still knows this container
    fn container_exists(&self, id: &str) -> Result<bool>;

    /// Run a command inside a running container and return combined output.
    /// A non-zero exit status is an error.
    fn exec(&self, id: &str, cmd: &[String]) -> Result<String>;

    /// Host ports published by running containers, managed or not
    fn published_ports(&self) -> Result<Vec<u16>>;

    /// Runtime volumes whose name matches the filter
    fn list_volumes(&self, name_filter: &str) -> Result<Vec<String>>;

    /// Remove a runtime volume
    fn remove_volume(&self, name: &str) -> Result<()>;

    /// Check that the runtime binary answers
    fn is_available(&self) -> bool;
}
