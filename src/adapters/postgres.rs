use super::{DatabaseAdapter, args, version_after};
use crate::credentials::Credentials;

/// Superuser created by the image; user-management commands run as it.
const ADMIN_USER: &str = "dbuser";

#[derive(Debug, Default)]
pub struct PostgresAdapter;

impl DatabaseAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["pg", "postgres", "postgresql"]
    }

    fn image_repository(&self) -> &'static str {
        "postgres"
    }

    fn default_version(&self) -> &'static str {
        "18"
    }

    fn default_port(&self) -> u16 {
        5432
    }

    fn env_vars(&self, db_name: &str, auth: Option<&Credentials>) -> Vec<String> {
        let mut env = vec![
            format!("POSTGRES_DB={db_name}"),
            "PGDATA=/var/lib/postgresql/data".to_string(),
        ];
        match auth {
            Some(creds) => {
                env.push(format!("POSTGRES_USER={}", creds.username));
                env.push(format!("POSTGRES_PASSWORD={}", creds.password));
            }
            None => {
                env.push(format!("POSTGRES_USER={ADMIN_USER}"));
                env.push("POSTGRES_HOST_AUTH_METHOD=trust".to_string());
            }
        }
        env
    }

    fn supports_username(&self) -> bool {
        true
    }

    fn data_path(&self) -> &'static str {
        "/var/lib/postgresql"
    }

    fn config_path(&self) -> &'static str {
        "/etc/postgresql"
    }

    fn config_file_name(&self) -> &'static str {
        "postgresql.conf"
    }

    fn default_config(&self) -> &'static str {
        r#"# PostgreSQL configuration file
# Managed by mkdb

# Connection Settings
max_connections = 100
shared_buffers = 128MB

# Logging
logging_collector = on
log_directory = 'log'
log_filename = 'postgresql-%Y-%m-%d_%H%M%S.log'
log_statement = 'all'
"#
    }

    fn create_user_command(
        &self,
        username: &str,
        password: &str,
        db_name: &str,
    ) -> Option<Vec<String>> {
        Some(psql(
            db_name,
            &format!(
                "CREATE USER {username} WITH PASSWORD '{password}'; GRANT ALL PRIVILEGES ON DATABASE \"{db_name}\" TO {username};"
            ),
        ))
    }

    fn delete_user_command(&self, username: &str, db_name: &str) -> Option<Vec<String>> {
        Some(psql(db_name, &format!("DROP USER IF EXISTS {username};")))
    }

    fn rotate_password_command(
        &self,
        username: &str,
        new_password: &str,
        db_name: &str,
    ) -> Option<Vec<String>> {
        Some(psql(
            db_name,
            &format!("ALTER USER {username} WITH PASSWORD '{new_password}';"),
        ))
    }

    fn connection_string(
        &self,
        auth: Option<&Credentials>,
        host: &str,
        port: u16,
        db_name: &str,
    ) -> String {
        match auth {
            Some(creds) => format!(
                "postgresql://{}:{}@{host}:{port}/{db_name}",
                creds.username, creds.password
            ),
            None => format!("postgresql://{host}:{port}/{db_name}"),
        }
    }

    fn version_command(&self) -> Option<Vec<String>> {
        Some(args(&["postgres", "--version"]))
    }

    fn parse_version(&self, output: &str) -> String {
        // postgres (PostgreSQL) 16.1 (Debian 16.1-1.pgdg120+1)
        version_after(output, "(PostgreSQL)").unwrap_or_else(|| output.trim().to_string())
    }

    fn ping_command(&self, _auth: Option<&Credentials>, db_name: &str) -> Option<Vec<String>> {
        Some(psql(
            db_name,
            "SELECT 1 as status, current_user, current_database();",
        ))
    }
}

fn psql(db_name: &str, sql: &str) -> Vec<String> {
    args(&["psql", "-U", ADMIN_USER, "-d", db_name, "-c", sql])
}
