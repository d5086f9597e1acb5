use crate::adapters::DatabaseAdapter;
use crate::credentials::{
    Credentials, DEFAULT_PASSWORD_LENGTH, DEFAULT_USERNAME, RESTORE_PASSWORD, generate_password,
};
use crate::domain::{
    Container, ContainerSpec, ContainerStatus, EventKind, NewUser, VolumeKind, extended_expiry,
};
use crate::error::{Error, Result};
use crate::services::{
    Context, PortAllocator, PortSelection, ResolvedVolume, VolumeRequest, VolumeService,
};
use chrono::{DateTime, TimeDelta, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MIN_TTL_HOURS: i64 = 1;
/// One year.
pub const MAX_TTL_HOURS: i64 = 24 * 365;
pub const RESTART_POLICY: &str = "unless-stopped";

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub db_type: String,
    pub display_name: String,
    /// Image tag; the adapter default when `None`
    pub version: Option<String>,
    /// Explicit host port; must be free
    pub port: Option<u16>,
    pub volume: VolumeRequest,
    pub ttl_hours: i64,
    pub no_auth: bool,
}

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    /// Orphaned volume directory; also becomes the display name
    pub volume_name: String,
    pub db_type: Option<String>,
    pub version: Option<String>,
    pub port: Option<u16>,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub container: Container,
    pub connection_string: String,
    pub username: Option<String>,
    /// Plaintext default password, shown once
    pub password: Option<String>,
    /// Set when the default port was busy and another one was chosen
    pub port_notice: Option<u16>,
}

/// What happened while tearing a container down. Destructive steps never
/// abort; each failure lands in `warnings`.
#[derive(Debug, Clone)]
pub struct RemoveReport {
    pub container: Container,
    pub warnings: Vec<String>,
    pub purged: bool,
}

/// Composes ports, volumes, credentials, the runtime and the store into the
/// container lifecycle.
pub struct Orchestrator<'a> {
    ctx: &'a Context,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Looks a container up by display name, or by internal `mkdb-` name.
    pub fn find(&self, name: &str) -> Result<Container> {
        let name = name.trim();
        if let Some(c) = self.ctx.store.get_container_by_display_name(name)? {
            return Ok(c);
        }
        self.ctx
            .store
            .get_container_by_name(name)?
            .ok_or_else(|| Error::NotFound(format!("banco '{name}'")))
    }

    pub fn create(&self, req: &CreateRequest) -> Result<CreateOutcome> {
        let display_name = req.display_name.trim();
        validate_display_name(display_name)?;
        validate_hours(req.ttl_hours)?;

        let adapter = self.ctx.registry.resolve(&req.db_type)?;
        self.ensure_name_free(display_name)?;

        let selection = PortAllocator::new(&self.ctx.containers)
            .resolve(req.port, adapter.default_port())?;
        let volume = VolumeService::new(&self.ctx.paths).resolve(&req.volume, display_name)?;

        let auth = (!req.no_auth).then(|| {
            Credentials::new(DEFAULT_USERNAME, generate_password(DEFAULT_PASSWORD_LENGTH))
        });
        let version = pick_version(req.version.as_deref(), None, adapter.as_ref());

        info!(
            "🚀 Criando {} ({}:{version}) na porta {}...",
            display_name,
            adapter.name(),
            selection.port
        );

        self.provision(
            adapter.as_ref(),
            display_name,
            &version,
            selection,
            &volume,
            auth,
            req.ttl_hours,
            EventKind::Created,
        )
    }

    pub fn restore(&self, req: &RestoreRequest) -> Result<CreateOutcome> {
        let name = req.volume_name.trim();
        validate_display_name(name)?;
        validate_hours(req.ttl_hours)?;

        let active = self.ctx.store.list_containers()?;
        let all = self.ctx.store.list_all_containers()?;
        let volumes = VolumeService::new(&self.ctx.paths);
        let orphan = volumes
            .scan_orphaned(&active, &all)?
            .into_iter()
            .find(|o| o.name == name)
            .ok_or_else(|| Error::NotFound(format!("volume órfão '{name}'")))?;

        self.ensure_name_free(name)?;

        let previous = orphan.previous.as_ref();
        let db_type = req
            .db_type
            .clone()
            .or_else(|| previous.map(|c| c.db_type.clone()))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "tipo do banco desconhecido para o volume '{name}'; informe o tipo explicitamente"
                ))
            })?;
        let adapter = self.ctx.registry.resolve(&db_type)?;
        let version = pick_version(
            req.version.as_deref(),
            previous.map(|c| c.version.as_str()),
            adapter.as_ref(),
        );

        let selection = PortAllocator::new(&self.ctx.containers)
            .resolve(req.port, adapter.default_port())?;
        let volume = ResolvedVolume {
            kind: VolumeKind::Named,
            reference: name.to_string(),
            host_path: Some(orphan.path.clone()),
            created: false,
        };
        let auth = Some(Credentials::new(DEFAULT_USERNAME, RESTORE_PASSWORD));

        info!("♻️  Restaurando {name} ({}:{version})...", adapter.name());

        self.provision(
            adapter.as_ref(),
            name,
            &version,
            selection,
            &volume,
            auth,
            req.ttl_hours,
            EventKind::Restored,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn provision(
        &self,
        adapter: &dyn DatabaseAdapter,
        display_name: &str,
        version: &str,
        selection: PortSelection,
        volume: &ResolvedVolume,
        auth: Option<Credentials>,
        ttl_hours: i64,
        event: EventKind,
    ) -> Result<CreateOutcome> {
        let now = self.ctx.now();
        let config_dir = self.ctx.paths.container_config_dir(display_name);
        let config_existed = config_dir.exists();
        let abandon = || {
            VolumeService::new(&self.ctx.paths).release(volume);
            if !config_existed {
                remove_config_dir(&config_dir);
            }
        };

        let staged = expiry_after(now, ttl_hours).and_then(|expires_at| {
            let password_hash = match &auth {
                Some(creds) => self.ctx.cipher.encrypt(&creds.password)?,
                None => String::new(),
            };
            Ok((expires_at, password_hash))
        });
        let (expires_at, password_hash) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                abandon();
                return Err(e);
            }
        };
        let default_user = NewUser {
            username: auth.as_ref().map(|c| c.username.clone()).unwrap_or_default(),
            password_hash,
            is_default: true,
            created_at: now,
        };

        let name = Container::internal_name(display_name);
        let launched = self.launch(
            adapter,
            &name,
            display_name,
            version,
            selection.port,
            volume,
            auth.as_ref(),
        );
        let runtime_id = match launched {
            Ok(id) => id,
            Err(e) => {
                abandon();
                return Err(e);
            }
        };

        let record = Container {
            id: 0,
            name,
            display_name: display_name.to_string(),
            db_type: adapter.name().to_string(),
            version: version.to_string(),
            container_id: runtime_id.clone(),
            port: selection.port,
            status: ContainerStatus::Running,
            created_at: now,
            expires_at,
            volume_kind: volume.kind,
            volume_ref: volume.reference.clone(),
        };

        let container = match self.ctx.store.insert_container(&record, &default_user) {
            Ok(saved) => saved,
            Err(e) => {
                self.ctx.containers.discard(&runtime_id, &record.name);
                abandon();
                return Err(e);
            }
        };

        self.ctx.store.insert_event(
            container.id,
            event,
            now,
            &format!("{}:{} na porta {}", adapter.name(), version, container.port),
        )?;

        let connection_string =
            adapter.connection_string(auth.as_ref(), &self.ctx.host, container.port, display_name);
        info!("✅ {} pronto em {}:{}", display_name, self.ctx.host, container.port);

        Ok(CreateOutcome {
            container,
            connection_string,
            username: auth.as_ref().map(|c| c.username.clone()),
            password: auth.map(|c| c.password),
            port_notice: selection.substituted_from,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn launch(
        &self,
        adapter: &dyn DatabaseAdapter,
        name: &str,
        display_name: &str,
        version: &str,
        port: u16,
        volume: &ResolvedVolume,
        auth: Option<&Credentials>,
    ) -> Result<String> {
        let config_dir = self.seed_config(adapter, display_name)?;
        let image = adapter.image(version);

        let ports = vec![format!("{port}:{}", adapter.default_port())];
        let env = adapter.env_vars(display_name, auth);
        let command = adapter.command_args(auth);
        let mut volumes: Vec<String> = volume.mount(adapter.data_path()).into_iter().collect();
        volumes.push(format!("{}:{}", config_dir.display(), adapter.config_path()));
        let labels = vec![
            "mkdb.managed=true".to_string(),
            format!("mkdb.type={}", adapter.name()),
            format!("mkdb.name={display_name}"),
        ];

        let spec = ContainerSpec {
            name,
            image: &image,
            ports: &ports,
            env: &env,
            volumes: &volumes,
            labels: &labels,
            command: &command,
            restart_policy: Some(RESTART_POLICY),
        };

        self.ctx.containers.launch(&spec)
    }

    /// Creates `configs/<display name>/<file>` with the adapter default unless
    /// the user already has one there.
    fn seed_config(&self, adapter: &dyn DatabaseAdapter, display_name: &str) -> Result<PathBuf> {
        let dir = self.ctx.paths.container_config_dir(display_name);
        fs::create_dir_all(&dir).map_err(|e| Error::io(format!("criando {}", dir.display()), e))?;

        let file = dir.join(adapter.config_file_name());
        if !file.exists() {
            fs::write(&file, adapter.default_config())
                .map_err(|e| Error::io(format!("gravando {}", file.display()), e))?;
            debug!("Configuração padrão gravada em {}", file.display());
        }
        Ok(dir)
    }

    fn ensure_name_free(&self, display_name: &str) -> Result<()> {
        let taken = self
            .ctx
            .store
            .get_container_by_display_name(display_name)?
            .is_some()
            || self
                .ctx
                .store
                .get_container_by_name(&Container::internal_name(display_name))?
                .is_some();

        if taken {
            return Err(Error::Conflict(format!(
                "já existe um banco chamado '{display_name}'"
            )));
        }
        Ok(())
    }

    /// Stops and removes the runtime instance, keeping the record and its data.
    pub fn stop(&self, name: &str) -> Result<Container> {
        let mut container = self.find(name)?;

        if self.ctx.containers.exists(&container.container_id)? {
            info!("🛑 Parando {}...", container.display_name);
            self.ctx
                .containers
                .stop(&container.container_id, &container.display_name)?;
            self.ctx
                .containers
                .remove(&container.container_id, &container.display_name)?;
        } else {
            debug!(
                "{} não tem instância no runtime, apenas atualizando o registro",
                container.display_name
            );
        }

        container.status = ContainerStatus::Stopped;
        container.container_id.clear();
        self.ctx.store.update_container(&container)?;
        self.ctx
            .store
            .insert_event(container.id, EventKind::Stopped, self.ctx.now(), "")?;

        Ok(container)
    }

    /// Restarts in place, or recreates the runtime instance from the record.
    pub fn restart(&self, name: &str) -> Result<Container> {
        let mut container = self.find(name)?;
        let adapter = self.ctx.registry.resolve(&container.db_type)?;

        let recreated = if self.ctx.containers.exists(&container.container_id)? {
            info!("🔄 Reiniciando {}...", container.display_name);
            self.ctx
                .containers
                .restart(&container.container_id, &container.display_name)?;
            false
        } else {
            info!("🔄 Recriando {}...", container.display_name);
            let auth = self.default_credentials(&container)?;
            let volume = VolumeService::new(&self.ctx.paths).for_record(&container);
            let runtime_id = self.launch(
                adapter.as_ref(),
                &container.name,
                &container.display_name,
                &container.version,
                container.port,
                &volume,
                auth.as_ref(),
            )?;
            container.container_id = runtime_id;
            true
        };

        container.status = ContainerStatus::Running;
        if let Err(e) = self.ctx.store.update_container(&container) {
            if recreated {
                self.ctx
                    .containers
                    .discard(&container.container_id, &container.name);
            }
            return Err(e);
        }
        let details = if recreated { "recriado" } else { "reiniciado" };
        self.ctx
            .store
            .insert_event(container.id, EventKind::Restarted, self.ctx.now(), details)?;

        Ok(container)
    }

    pub fn remove(&self, name: &str, purge: bool) -> Result<RemoveReport> {
        let container = self.find(name)?;
        info!("🗑️  Removendo {}...", container.display_name);
        self.retire(&container, purge, None)
    }

    /// Shared teardown for `remove` and expiration. `reason` is logged before
    /// the `deleted` event.
    pub(crate) fn retire(
        &self,
        container: &Container,
        purge: bool,
        reason: Option<EventKind>,
    ) -> Result<RemoveReport> {
        let mut warnings = Vec::new();
        let shown = &container.display_name;

        if container.has_runtime_instance() {
            let present = match self.ctx.containers.exists(&container.container_id) {
                Ok(present) => present,
                Err(e) => {
                    warnings.push(e.to_string());
                    true
                }
            };

            if present {
                match self.ctx.containers.stop(&container.container_id, shown) {
                    Ok(_) => debug!("{shown} parado"),
                    Err(e) => warnings.push(e.to_string()),
                }
                match self.ctx.containers.remove(&container.container_id, shown) {
                    Ok(_) => debug!("{shown} removido do runtime"),
                    Err(e) => warnings.push(e.to_string()),
                }
            }
        }

        if !container.volume_ref.is_empty() {
            warnings.extend(self.ctx.containers.remove_volumes(&container.volume_ref));
        }

        let mut purged = false;
        if purge && container.volume_kind == VolumeKind::Named {
            match VolumeService::new(&self.ctx.paths).purge(&container.volume_ref) {
                Ok(removed) => purged = removed,
                Err(e) => warnings.push(e.to_string()),
            }
        }

        let config_dir = self.ctx.paths.container_config_dir(shown);
        if config_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&config_dir) {
                warnings.push(format!("falha ao apagar {}: {e}", config_dir.display()));
            }
        }

        for warning in &warnings {
            warn!("⚠️  {shown}: {warning}");
        }

        let now = self.ctx.now();
        if let Some(kind) = reason {
            self.ctx.store.insert_event(container.id, kind, now, "")?;
        }
        let details = if warnings.is_empty() {
            String::new()
        } else {
            format!("{} aviso(s)", warnings.len())
        };
        self.ctx
            .store
            .insert_event(container.id, EventKind::Deleted, now, &details)?;
        self.ctx.store.delete_container(container.id)?;

        Ok(RemoveReport {
            container: container.clone(),
            warnings,
            purged,
        })
    }

    pub fn extend(&self, name: &str, hours: i64) -> Result<Container> {
        validate_hours(hours)?;
        let container = self.find(name)?;
        self.extend_record(container, hours)
    }

    pub(crate) fn extend_record(&self, mut container: Container, hours: i64) -> Result<Container> {
        validate_hours(hours)?;
        let now = self.ctx.now();
        container.expires_at = extended_expiry(container.expires_at, now, hours)
            .ok_or_else(|| out_of_range(hours))?;

        self.ctx.store.update_container(&container)?;
        self.ctx.store.insert_event(
            container.id,
            EventKind::TtlExtended,
            now,
            &format!("+{hours}h, expira em {}", container.expires_at.to_rfc3339()),
        )?;

        info!(
            "⏰ {} estendido até {}",
            container.display_name,
            container.expires_at.format("%Y-%m-%d %H:%M UTC")
        );
        Ok(container)
    }

    /// Decrypted default credentials; `None` for unauthenticated containers.
    pub fn default_credentials(&self, container: &Container) -> Result<Option<Credentials>> {
        let Some(user) = self.ctx.store.get_default_user(container.id)? else {
            return Ok(None);
        };
        if user.is_unauthenticated() {
            return Ok(None);
        }

        let password = self.ctx.cipher.decrypt(&user.password_hash)?;
        Ok(Some(Credentials::new(user.username, password)))
    }
}

fn pick_version(requested: Option<&str>, previous: Option<&str>, adapter: &dyn DatabaseAdapter) -> String {
    requested
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or(previous.filter(|v| !v.is_empty()))
        .unwrap_or(adapter.default_version())
        .to_string()
}

/// Display names become container, database and directory names.
pub fn validate_display_name(name: &str) -> Result<()> {
    let Some(first) = name.chars().next() else {
        return Err(Error::Validation("nome do banco vazio".to_string()));
    };

    if !first.is_ascii_alphanumeric() {
        return Err(Error::Validation(format!(
            "nome '{name}' deve começar com letra ou número"
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '.' | '-'))
    {
        return Err(Error::Validation(format!(
            "nome '{name}' contém caractere inválido '{c}'"
        )));
    }

    Ok(())
}

fn validate_hours(hours: i64) -> Result<()> {
    if hours < MIN_TTL_HOURS {
        return Err(Error::Validation(format!(
            "o tempo de vida deve ser de pelo menos {MIN_TTL_HOURS}h (recebido {hours})"
        )));
    }
    if hours > MAX_TTL_HOURS {
        return Err(Error::Validation(format!(
            "o tempo de vida deve ser de no máximo {MAX_TTL_HOURS}h (recebido {hours})"
        )));
    }
    Ok(())
}

fn expiry_after(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_hours(hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| out_of_range(hours))
}

fn out_of_range(hours: i64) -> Error {
    Error::Validation(format!("tempo de vida fora do intervalo suportado: {hours}h"))
}

fn remove_config_dir(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(_) => debug!("{} descartado", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("⚠️  Não foi possível apagar {}: {e}", dir.display()),
    }
}
