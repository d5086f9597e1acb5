use crate::cli::commands::{Cli, Commands, CredsAction, StartArgs, UserAction};
use crate::cli::prompt::TerminalPrompt;
use crate::cli::render;
use crate::domain::{ContainerRuntime, DisplayStatus};
use crate::infra::config::{LastSettings, MkdbConfig};
use crate::infra::podman_adapter::DEFAULT_BINARY;
use crate::infra::{DataPaths, PodmanAdapter};
use crate::services::{
    Context, CreateOutcome, CreateRequest, ExpirationEngine, ExpiryPrompt, Inventory, ListFilter,
    Orchestrator, RestoreRequest, SweepReport, UserService, VolumeRequest,
};
use anyhow::{Context as _, Result, bail};
use std::env;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

/// One CLI invocation: the opened state plus the user's `mkdb.toml`.
pub struct App {
    ctx: Context,
    config: MkdbConfig,
    prompt: TerminalPrompt,
}

impl App {
    /// Opens the data directory with the runtime named by the flag, the
    /// config file, or `podman`, in that order.
    pub fn open(data_dir: &Path, runtime_binary: Option<&str>) -> Result<Self> {
        let config = MkdbConfig::load(&DataPaths::new(data_dir).config_file())?;
        let binary = runtime_binary
            .map(str::to_string)
            .or_else(|| config.runtime.binary.clone())
            .unwrap_or_else(|| DEFAULT_BINARY.to_string());
        debug!("Usando runtime {binary}");

        Self::with_config(data_dir, Arc::new(PodmanAdapter::with_binary(binary)), config)
    }

    pub fn with_runtime(data_dir: &Path, runtime: Arc<dyn ContainerRuntime>) -> Result<Self> {
        let config = MkdbConfig::load(&DataPaths::new(data_dir).config_file())?;
        Self::with_config(data_dir, runtime, config)
    }

    fn with_config(
        data_dir: &Path,
        runtime: Arc<dyn ContainerRuntime>,
        config: MkdbConfig,
    ) -> Result<Self> {
        let ctx = Context::open(DataPaths::new(data_dir), runtime)
            .with_context(|| format!("abrindo estado em {:?}", data_dir))?
            .with_host(config.defaults.host.clone());
        Ok(Self::from_context(ctx, config))
    }

    pub fn from_context(ctx: Context, config: MkdbConfig) -> Self {
        Self {
            ctx,
            config,
            prompt: TerminalPrompt,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn sweep(&self, prompt: &dyn ExpiryPrompt) -> Result<SweepReport> {
        Ok(ExpirationEngine::new(&self.ctx).sweep(prompt)?)
    }

    /// Creates a database, filling gaps from the last `start` when asked to,
    /// and remembers the parameters for the next `--repeat`.
    pub fn start(&self, args: &StartArgs) -> Result<CreateOutcome> {
        let request = self.create_request(args)?;
        let outcome = Orchestrator::new(&self.ctx).create(&request)?;

        let settings = LastSettings {
            db_type: outcome.container.db_type.clone(),
            name: outcome.container.display_name.clone(),
            version: request.version.clone().unwrap_or_default(),
            port: request.port,
            volume: request.volume.as_setting(),
            ttl_hours: request.ttl_hours,
            no_auth: request.no_auth,
        };
        if let Err(e) = settings.save(&self.ctx.paths.last_settings()) {
            warn!("⚠️  Não foi possível salvar as últimas configurações: {e:#}");
        }

        Ok(outcome)
    }

    pub fn create_request(&self, args: &StartArgs) -> Result<CreateRequest> {
        let last = if args.repeat {
            let last = LastSettings::load(&self.ctx.paths.last_settings())?
                .context("nenhum 'mkdb start' anterior para repetir")?;
            Some(last)
        } else {
            None
        };
        let last = last.as_ref();

        let db_type = args
            .db
            .clone()
            .or_else(|| last.map(|l| l.db_type.clone()))
            .context("informe o tipo do banco com --db (postgres, mysql, redis)")?;
        let display_name = args
            .name
            .clone()
            .or_else(|| last.map(|l| l.name.clone()))
            .context("informe o nome do banco com --name")?;
        let version = args
            .version
            .clone()
            .or_else(|| last.map(|l| l.version.clone()))
            .filter(|v| !v.trim().is_empty());
        let volume = match args.volume.as_deref().or(last.map(|l| l.volume.as_str())) {
            Some(v) => v.parse::<VolumeRequest>()?,
            None => VolumeRequest::None,
        };

        Ok(CreateRequest {
            db_type,
            display_name,
            version,
            port: args.port.or_else(|| last.and_then(|l| l.port)),
            volume,
            ttl_hours: args
                .ttl
                .or_else(|| last.map(|l| l.ttl_hours))
                .unwrap_or(self.config.defaults.ttl_hours),
            no_auth: args.no_auth || last.is_some_and(|l| l.no_auth),
        })
    }

    /// Runs one subcommand after the expiration sweep.
    pub fn dispatch(&self, command: Commands) -> Result<()> {
        if command.sweeps_first() {
            match self.sweep(&self.prompt) {
                Ok(report) => render::sweep(&report),
                Err(e) => warn!("⚠️  Falha ao revisar bancos expirados: {e:#}"),
            }
        }

        match command {
            Commands::Start(args) => {
                let outcome = self.start(&args)?;
                render::created(&outcome);
            }
            Commands::Stop { name } => {
                let name = self.pick(name, "parar")?;
                let container = Orchestrator::new(&self.ctx).stop(&name)?;
                println!("🛑 {} parado", container.display_name);
            }
            Commands::Restart { name } => {
                let name = self.pick(name, "reiniciar")?;
                let container = Orchestrator::new(&self.ctx).restart(&name)?;
                println!(
                    "✅ {} rodando na porta {}",
                    container.display_name, container.port
                );
            }
            Commands::Remove { name, purge } => {
                let name = self.pick(name, "remover")?;
                let report = Orchestrator::new(&self.ctx).remove(&name, purge)?;
                render::removed(&report);
            }
            Commands::List {
                db_type,
                status,
                all,
            } => {
                let status = match status.as_deref() {
                    Some(s) => Some(DisplayStatus::parse_filter(s).with_context(|| {
                        format!("status '{s}' inválido (running, stopped, expired, removed)")
                    })?),
                    None => None,
                };
                let views = Inventory::new(&self.ctx).list(&ListFilter {
                    db_type,
                    status,
                    include_removed: all,
                })?;
                render::list(&views, self.ctx.now());
            }
            Commands::Extend { name, hours } => {
                let name = self.pick(name, "estender")?;
                Orchestrator::new(&self.ctx).extend(&name, hours)?;
            }
            Commands::Restore {
                volume,
                db_type,
                version,
                port,
                ttl,
            } => {
                let volume_name = match volume {
                    Some(v) => v,
                    None => self.pick_orphan()?,
                };
                let outcome = Orchestrator::new(&self.ctx).restore(&RestoreRequest {
                    volume_name,
                    db_type,
                    version,
                    port,
                    ttl_hours: ttl.unwrap_or(self.config.defaults.ttl_hours),
                })?;
                render::created(&outcome);
            }
            Commands::User { action } => match action {
                UserAction::Create { name, username } => {
                    let name = self.pick(name, "receberá o usuário")?;
                    let issued = UserService::new(&self.ctx).create_user(&name, &username)?;
                    println!("👤 Usuário criado em {name}");
                    render::issued(&issued);
                }
                UserAction::Delete { name, username } => {
                    let name = self.pick(name, "perderá o usuário")?;
                    UserService::new(&self.ctx).delete_user(&name, &username)?;
                    println!("✅ Usuário {username} removido de {name}");
                }
            },
            Commands::Creds { action } => match action {
                CredsAction::Get { name } => {
                    let name = self.pick(name, "consultar")?;
                    let info = Inventory::new(&self.ctx).connection_info(&name)?;
                    render::connection(&info);
                }
                CredsAction::Rotate { name, user } => {
                    let name = self.pick(name, "trocar a senha")?;
                    let issued =
                        UserService::new(&self.ctx).rotate_password(&name, user.as_deref())?;
                    println!("🔑 Nova senha gerada para {name}");
                    render::issued(&issued);
                }
            },
            Commands::Info { name } => {
                let name = self.pick(name, "detalhar")?;
                let info = Inventory::new(&self.ctx).info(&name)?;
                render::info(&info, self.ctx.now());
            }
            Commands::Ping { name } => {
                let name = self.pick(name, "testar")?;
                let output = Inventory::new(&self.ctx).ping(&name)?;
                println!("✅ {name} respondeu: {}", output.trim());
            }
            Commands::Config { name } => {
                let name = self.pick(name, "configurar")?;
                self.edit_config(&name)?;
            }
            Commands::Cleanup => self.cleanup()?,
            Commands::Doctor => self.doctor()?,
            Commands::Version => print_version(),
        }

        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        if !self.prompt.is_interactive() {
            bail!("'mkdb cleanup' precisa de um terminal interativo");
        }

        let report = self.sweep(&self.prompt)?;
        if report.expired_found == 0 {
            println!("✨ Nenhum banco expirado");
        }
        render::sweep(&report);
        Ok(())
    }

    fn edit_config(&self, name: &str) -> Result<()> {
        let container = Orchestrator::new(&self.ctx).find(name)?;
        let adapter = self.ctx.registry.resolve(&container.db_type)?;
        let file = self
            .ctx
            .paths
            .container_config_dir(&container.display_name)
            .join(adapter.config_file_name());

        if !file.exists() {
            bail!("Arquivo de configuração não encontrado: {:?}", file);
        }

        let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
        let status = Command::new(&editor)
            .arg(&file)
            .status()
            .with_context(|| format!("abrindo {editor}"))?;
        if !status.success() {
            bail!("{editor} terminou com {status}");
        }

        println!(
            "💡 Reinicie para aplicar: mkdb restart --name {}",
            container.display_name
        );
        Ok(())
    }

    fn doctor(&self) -> Result<()> {
        let paths = &self.ctx.paths;
        println!("🩺 Diagnóstico do mkdb");

        if self.ctx.containers.is_available() {
            println!("✅ Runtime de containers respondendo");
        } else {
            println!("❌ Runtime de containers indisponível (veja --runtime ou MKDB_RUNTIME)");
        }

        println!("📁 Dados:  {:?}", paths.root());
        println!("🗄️  Banco:  {:?}", paths.database());
        let key = if paths.encryption_key().exists() {
            "✅"
        } else {
            "❌"
        };
        println!("{key} Chave:  {:?}", paths.encryption_key());

        let active = self.ctx.store.list_containers()?;
        let expired = self.ctx.store.get_expired(self.ctx.now())?;
        let orphans = Inventory::new(&self.ctx).orphans()?;
        println!(
            "📦 {} banco(s), {} expirado(s), {} volume(s) órfão(s)",
            active.len(),
            expired.len(),
            orphans.len()
        );

        for adapter_name in self.ctx.registry.list() {
            debug!("Adaptador disponível: {adapter_name}");
        }
        Ok(())
    }

    /// Uses `name` when given, otherwise asks which database to act on.
    fn pick(&self, name: Option<String>, action: &str) -> Result<String> {
        if let Some(name) = name {
            return Ok(name);
        }

        let names: Vec<String> = self
            .ctx
            .store
            .list_containers()?
            .into_iter()
            .map(|c| c.display_name)
            .collect();
        if names.is_empty() {
            bail!("Nenhum banco encontrado. Crie um com 'mkdb start'.");
        }

        self.prompt
            .select(&format!("Qual banco {action}?"), &names)?
            .context("informe o banco com --name")
    }

    fn pick_orphan(&self) -> Result<String> {
        let names: Vec<String> = Inventory::new(&self.ctx)
            .orphans()?
            .into_iter()
            .map(|o| o.name)
            .collect();
        if names.is_empty() {
            bail!("Nenhum volume órfão para restaurar");
        }

        self.prompt
            .select("Qual volume restaurar?", &names)?
            .context("informe o volume com --volume")
    }
}

fn print_version() {
    println!("mkdb {}", env!("CARGO_PKG_VERSION"));
}

/// Entry point used by the binary.
pub fn run(cli: Cli) -> Result<()> {
    if matches!(cli.command, Commands::Version) {
        print_version();
        return Ok(());
    }

    let app = App::open(&cli.data_dir, cli.runtime.as_deref())?;
    app.dispatch(cli.command)
}
