use crate::domain::{Container, ContainerStatus, DisplayStatus, Event};
use crate::error::{Error, Result};
use crate::services::{Context, Orchestrator, OrphanedVolume, VolumeService};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Type name or alias
    pub db_type: Option<String>,
    pub status: Option<DisplayStatus>,
    /// Also show orphaned volumes as `removed`
    pub include_removed: bool,
}

/// One row of `list`, either a live record or an orphaned volume.
#[derive(Debug, Clone)]
pub struct ContainerView {
    pub display_name: String,
    /// Empty when an orphan has no known history
    pub db_type: String,
    pub version: String,
    pub port: Option<u16>,
    pub status: DisplayStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub volume: String,
    pub size_bytes: Option<u64>,
}

impl ContainerView {
    fn from_record(c: &Container, now: DateTime<Utc>) -> Self {
        Self {
            display_name: c.display_name.clone(),
            db_type: c.db_type.clone(),
            version: c.version.clone(),
            port: Some(c.port),
            status: c.display_status(now),
            created_at: Some(c.created_at),
            expires_at: Some(c.expires_at),
            volume: match c.volume_ref.as_str() {
                "" => c.volume_kind.as_str().to_string(),
                reference => format!("{} ({reference})", c.volume_kind.as_str()),
            },
            size_bytes: None,
        }
    }

    fn from_orphan(o: &OrphanedVolume) -> Self {
        let previous = o.previous.as_ref();
        Self {
            display_name: o.name.clone(),
            db_type: previous.map(|c| c.db_type.clone()).unwrap_or_default(),
            version: previous.map(|c| c.version.clone()).unwrap_or_default(),
            port: None,
            status: DisplayStatus::Removed,
            created_at: previous.map(|c| c.created_at),
            expires_at: None,
            volume: o.path.display().to_string(),
            size_bytes: Some(o.size_bytes),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserSummary {
    pub username: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub container: Container,
    pub status: DisplayStatus,
    /// Version reported by the server itself, when it could be probed
    pub live_version: Option<String>,
    pub users: Vec<UserSummary>,
    pub events: Vec<Event>,
    pub config_file: PathBuf,
    pub volume_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub display_name: String,
    pub db_type: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection_string: String,
}

/// Read-side queries. Nothing here mutates the store or the runtime.
pub struct Inventory<'a> {
    ctx: &'a Context,
}

impl<'a> Inventory<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerView>> {
        let db_type = filter
            .db_type
            .as_deref()
            .map(|t| self.ctx.registry.normalize(t))
            .transpose()?;
        let now = self.ctx.now();

        let records = self.ctx.store.list_containers()?;
        let mut views: Vec<ContainerView> = records
            .iter()
            .filter(|c| db_type.is_none_or(|t| c.db_type == t))
            .map(|c| ContainerView::from_record(c, now))
            .filter(|v| filter.status.is_none_or(|s| v.status == s))
            .collect();

        let wants_removed =
            filter.include_removed || filter.status == Some(DisplayStatus::Removed);
        if wants_removed {
            let all = self.ctx.store.list_all_containers()?;
            let orphans = VolumeService::new(&self.ctx.paths).scan_orphaned(&records, &all)?;
            views.extend(
                orphans
                    .iter()
                    .map(ContainerView::from_orphan)
                    .filter(|v| db_type.is_none_or(|t| v.db_type == t))
                    .filter(|v| filter.status.is_none_or(|s| v.status == s)),
            );
        }

        Ok(views)
    }

    pub fn orphans(&self) -> Result<Vec<OrphanedVolume>> {
        let active = self.ctx.store.list_containers()?;
        let all = self.ctx.store.list_all_containers()?;
        VolumeService::new(&self.ctx.paths).scan_orphaned(&active, &all)
    }

    pub fn info(&self, name: &str) -> Result<ContainerInfo> {
        let container = Orchestrator::new(self.ctx).find(name)?;
        let adapter = self.ctx.registry.resolve(&container.db_type)?;

        let live_version = match adapter.version_command() {
            Some(cmd) if self.is_live(&container) => {
                match self.ctx.containers.exec(
                    &container.container_id,
                    &container.display_name,
                    &cmd,
                ) {
                    Ok(output) => Some(adapter.parse_version(&output)),
                    Err(e) => {
                        warn!("Não foi possível obter a versão de {}: {e}", container.display_name);
                        None
                    }
                }
            }
            _ => None,
        };

        let users = self
            .ctx
            .store
            .list_users(container.id)?
            .into_iter()
            .map(|u| UserSummary {
                username: u.username,
                is_default: u.is_default,
                created_at: u.created_at,
            })
            .collect();
        let events = self.ctx.store.list_events(container.id)?;

        let config_file = self
            .ctx
            .paths
            .container_config_dir(&container.display_name)
            .join(adapter.config_file_name());
        let volume_path = VolumeService::new(&self.ctx.paths)
            .for_record(&container)
            .host_path;

        Ok(ContainerInfo {
            status: container.display_status(self.ctx.now()),
            container,
            live_version,
            users,
            events,
            config_file,
            volume_path,
        })
    }

    /// Connection details for the default user, password decrypted.
    pub fn connection_info(&self, name: &str) -> Result<ConnectionInfo> {
        let orchestrator = Orchestrator::new(self.ctx);
        let container = orchestrator.find(name)?;
        let adapter = self.ctx.registry.resolve(&container.db_type)?;
        let creds = orchestrator.default_credentials(&container)?;

        let connection_string = adapter.connection_string(
            creds.as_ref(),
            &self.ctx.host,
            container.port,
            &container.display_name,
        );
        // Redis auth is password-only; the stored default username is not shown.
        let (username, password) = match creds {
            Some(c) if adapter.supports_username() => (Some(c.username), Some(c.password)),
            Some(c) => (None, Some(c.password)),
            None => (None, None),
        };

        Ok(ConnectionInfo {
            display_name: container.display_name,
            db_type: container.db_type,
            host: self.ctx.host.clone(),
            port: container.port,
            username,
            password,
            connection_string,
        })
    }

    /// Runs the adapter's connectivity probe inside the container.
    pub fn ping(&self, name: &str) -> Result<String> {
        let orchestrator = Orchestrator::new(self.ctx);
        let container = orchestrator.find(name)?;
        if !self.is_live(&container) {
            return Err(Error::Validation(format!(
                "{} não está rodando",
                container.display_name
            )));
        }

        let adapter = self.ctx.registry.resolve(&container.db_type)?;
        let creds = orchestrator.default_credentials(&container)?;
        let cmd = adapter
            .ping_command(creds.as_ref(), &container.display_name)
            .ok_or_else(|| Error::Unsupported {
                operation: "teste de conexão",
                db_type: container.db_type.clone(),
            })?;

        self.ctx
            .containers
            .exec(&container.container_id, &container.display_name, &cmd)
    }

    fn is_live(&self, container: &Container) -> bool {
        container.status == ContainerStatus::Running && container.has_runtime_instance()
    }
}
