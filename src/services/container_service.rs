use crate::domain::{ContainerRuntime, ContainerSpec};
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Graceful stop window before the runtime kills the container.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime operations in domain terms, with failures mapped to [`Error::Runtime`].
#[derive(Debug, Clone)]
pub struct ContainerService {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Pulls, creates and starts a container, returning its runtime id.
    ///
    /// If start fails the half-created container is removed before the error
    /// is returned.
    pub fn launch(&self, spec: &ContainerSpec) -> Result<String> {
        info!("📦 Preparando imagem {}...", spec.image);
        self.runtime
            .pull_image(spec.image)
            .map_err(|e| Error::runtime(format!("baixar {}", spec.image), e))?;

        let id = self
            .runtime
            .create_container(spec)
            .map_err(|e| Error::runtime(format!("criar {}", spec.name), e))?;

        if let Err(e) = self.runtime.start_container(&id) {
            self.discard(&id, spec.name);
            return Err(Error::runtime(format!("iniciar {}", spec.name), e));
        }

        debug!("Container {} iniciado ({id})", spec.name);
        Ok(id)
    }

    /// Best-effort removal used to undo a partial create.
    pub fn discard(&self, id: &str, name: &str) {
        match self.runtime.remove_container(id) {
            Ok(_) => debug!("Container {name} descartado"),
            Err(e) => warn!("⚠️  Não foi possível descartar {name}: {e:#}"),
        }
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        if id.is_empty() {
            return Ok(false);
        }
        self.runtime
            .container_exists(id)
            .map_err(|e| Error::runtime(format!("inspecionar {id}"), e))
    }

    pub fn stop(&self, id: &str, name: &str) -> Result<()> {
        self.runtime
            .stop_container(id, STOP_TIMEOUT)
            .map_err(|e| Error::runtime(format!("parar {name}"), e))
    }

    pub fn remove(&self, id: &str, name: &str) -> Result<()> {
        self.runtime
            .remove_container(id)
            .map_err(|e| Error::runtime(format!("remover {name}"), e))
    }

    pub fn restart(&self, id: &str, name: &str) -> Result<()> {
        self.runtime
            .restart_container(id, STOP_TIMEOUT)
            .map_err(|e| Error::runtime(format!("reiniciar {name}"), e))
    }

    pub fn exec(&self, id: &str, name: &str, cmd: &[String]) -> Result<String> {
        self.runtime
            .exec(id, cmd)
            .map_err(|e| Error::runtime(format!("executar comando em {name}"), e))
    }

    pub fn published_ports(&self) -> Result<Vec<u16>> {
        self.runtime
            .published_ports()
            .map_err(|e| Error::runtime("listar portas em uso", e))
    }

    /// Removes the runtime volume named exactly `name`. The runtime's name
    /// filter matches substrings, so its results are narrowed here. Each
    /// failure becomes a warning; nothing here aborts the caller.
    pub fn remove_volumes(&self, name: &str) -> Vec<String> {
        let mut warnings = Vec::new();

        let volumes = match self.runtime.list_volumes(name) {
            Ok(volumes) => volumes,
            Err(e) => {
                warnings.push(format!("falha ao listar volumes {name}: {e:#}"));
                return warnings;
            }
        };

        for volume in volumes.into_iter().filter(|v| v == name) {
            match self.runtime.remove_volume(&volume) {
                Ok(_) => debug!("Volume {volume} removido"),
                Err(e) => warnings.push(format!("falha ao remover volume {volume}: {e:#}")),
            }
        }

        warnings
    }

    pub fn is_available(&self) -> bool {
        self.runtime.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRuntime;

    #[test]
    fn remove_volumes_ignores_names_that_only_share_a_prefix() {
        let mock = Arc::new(MockRuntime::new());
        mock.add_volume("dev");
        mock.add_volume("devdb-data");
        mock.add_volume("old-dev");

        let service = ContainerService::new(mock.clone());
        assert!(service.remove_volumes("dev").is_empty());

        assert_eq!(mock.volumes(), vec!["devdb-data".to_string(), "old-dev".to_string()]);
        assert!(!mock.get_commands().iter().any(|c| c == "remove_volume:devdb-data"));
    }
}
