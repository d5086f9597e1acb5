use crate::infra::config::default_data_dir;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mkdb",
    version,
    about = "Bancos de dados descartáveis em containers, com prazo de validade"
)]
pub struct Cli {
    /// Diretório de dados (default: ~/.local/share/mkdb)
    #[arg(long, global = true, env = "MKDB_DATA_DIR", default_value_os_t = default_data_dir())]
    pub data_dir: PathBuf,

    /// Binário do runtime de containers (podman, docker, ...)
    #[arg(long, global = true, env = "MKDB_RUNTIME")]
    pub runtime: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cria e sobe um novo banco
    Start(StartArgs),
    /// Para um banco, mantendo registro e dados
    Stop {
        #[arg(long)]
        name: Option<String>,
    },
    /// Reinicia um banco, recriando o container se necessário
    Restart {
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove um banco e seu container
    #[command(visible_alias = "rm")]
    Remove {
        #[arg(long)]
        name: Option<String>,
        /// Apaga também o diretório do volume nomeado
        #[arg(long)]
        purge: bool,
    },
    /// Lista os bancos
    #[command(visible_alias = "ls")]
    List {
        /// Filtra por tipo (postgres, mysql, redis ou apelido)
        #[arg(long = "type")]
        db_type: Option<String>,
        /// Filtra por status (running, stopped, expired, removed)
        #[arg(long)]
        status: Option<String>,
        /// Inclui volumes órfãos de bancos removidos
        #[arg(short, long)]
        all: bool,
    },
    /// Estende o prazo de validade de um banco
    Extend {
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 1)]
        hours: i64,
    },
    /// Recria um banco a partir de um volume órfão
    Restore {
        /// Nome do volume órfão (vira o nome do banco)
        #[arg(long)]
        volume: Option<String>,
        /// Tipo do banco; obrigatório quando não há histórico do volume
        #[arg(long = "type")]
        db_type: Option<String>,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        ttl: Option<i64>,
    },
    /// Gerencia usuários do banco
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Credenciais do usuário padrão
    Creds {
        #[command(subcommand)]
        action: CredsAction,
    },
    /// Mostra detalhes, usuários e histórico de um banco
    Info {
        #[arg(long)]
        name: Option<String>,
    },
    /// Testa a conexão com o banco
    #[command(visible_alias = "test")]
    Ping {
        #[arg(long)]
        name: Option<String>,
    },
    /// Abre o arquivo de configuração do banco no $EDITOR
    Config {
        #[arg(long)]
        name: Option<String>,
    },
    /// Revisa agora os bancos expirados
    Cleanup,
    /// Verifica runtime, diretório de dados e estado salvo
    Doctor,
    /// Mostra a versão
    Version,
}

impl Commands {
    /// Whether the expiration sweep runs before this command.
    pub fn sweeps_first(&self) -> bool {
        !matches!(self, Self::Version | Self::Cleanup)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Tipo do banco (postgres, mysql, redis ou apelido)
    #[arg(long)]
    pub db: Option<String>,
    /// Nome do banco
    #[arg(long)]
    pub name: Option<String>,
    /// Versão (tag da imagem)
    #[arg(long)]
    pub version: Option<String>,
    /// Porta no host
    #[arg(long)]
    pub port: Option<u16>,
    /// none, named ou um caminho para bind mount
    #[arg(long)]
    pub volume: Option<String>,
    /// Prazo de validade em horas
    #[arg(long)]
    pub ttl: Option<i64>,
    /// Repete as configurações do último start
    #[arg(long)]
    pub repeat: bool,
    /// Cria o banco sem autenticação
    #[arg(long)]
    pub no_auth: bool,
}

#[derive(Subcommand, Debug)]
pub enum UserAction {
    /// Cria um usuário com senha gerada
    Create {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        username: String,
    },
    /// Remove um usuário
    Delete {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        username: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CredsAction {
    /// Mostra a string de conexão do usuário padrão
    Get {
        #[arg(long)]
        name: Option<String>,
    },
    /// Gera uma nova senha
    Rotate {
        #[arg(long)]
        name: Option<String>,
        /// Usuário a trocar (default: usuário padrão)
        #[arg(long)]
        user: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_start_flags() {
        let cli = Cli::try_parse_from([
            "mkdb", "start", "--db", "pg", "--name", "devdb", "--port", "5433", "--ttl", "4",
            "--no-auth",
        ])
        .unwrap();

        let Commands::Start(args) = cli.command else {
            panic!("expected start");
        };
        assert_eq!(args.db.as_deref(), Some("pg"));
        assert_eq!(args.port, Some(5433));
        assert_eq!(args.ttl, Some(4));
        assert!(args.no_auth);
        assert!(!args.repeat);
    }

    #[test]
    fn test_aliases_and_defaults() {
        let cli = Cli::try_parse_from(["mkdb", "rm", "--name", "x", "--purge"]).unwrap();
        assert!(matches!(cli.command, Commands::Remove { purge: true, .. }));

        let cli = Cli::try_parse_from(["mkdb", "extend", "--name", "x"]).unwrap();
        assert!(matches!(cli.command, Commands::Extend { hours: 1, .. }));

        let cli = Cli::try_parse_from(["mkdb", "ls", "-a"]).unwrap();
        assert!(matches!(cli.command, Commands::List { all: true, .. }));
    }

    #[test]
    fn test_version_skips_the_sweep() {
        assert!(!Commands::Version.sweeps_first());
        assert!(!Commands::Cleanup.sweeps_first());
        assert!(Commands::Doctor.sweeps_first());
    }
}
