use crate::adapters::AdapterRegistry;
use crate::credentials::CredentialCipher;
use crate::domain::ContainerRuntime;
use crate::error::{Error, Result};
use crate::infra::{DataPaths, Store};
use crate::infra::config::DEFAULT_HOST;
use crate::services::ContainerService;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;

/// Source of "now" for TTL decisions.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything one invocation needs, built once and passed down explicitly.
#[derive(Debug)]
pub struct Context {
    pub containers: ContainerService,
    pub store: Store,
    pub cipher: CredentialCipher,
    pub registry: AdapterRegistry,
    pub paths: DataPaths,
    pub clock: Arc<dyn Clock>,
    /// Host written into connection strings
    pub host: String,
}

impl Context {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Store,
        cipher: CredentialCipher,
        paths: DataPaths,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            containers: ContainerService::new(runtime),
            store,
            cipher,
            registry: AdapterRegistry::builtin(),
            paths,
            clock,
            host: DEFAULT_HOST.to_string(),
        }
    }

    /// Opens the state under `paths`, creating the directory layout, the
    /// database and the encryption key as needed.
    pub fn open(paths: DataPaths, runtime: Arc<dyn ContainerRuntime>) -> Result<Self> {
        paths
            .ensure()
            .map_err(|e| Error::io(format!("criando {}", paths.root().display()), e))?;

        let store = Store::open(&paths.database())?;
        let cipher = CredentialCipher::load_or_create(&paths.encryption_key())?;

        Ok(Self::new(runtime, store, cipher, paths, Arc::new(SystemClock)))
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
