use super::{DatabaseAdapter, args, version_after};
use crate::credentials::Credentials;

const ROOT_PASSWORD: &str = "rootpassword";

#[derive(Debug, Default)]
pub struct MySqlAdapter;

impl DatabaseAdapter for MySqlAdapter {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["mysql", "mariadb"]
    }

    fn image_repository(&self) -> &'static str {
        "mysql"
    }

    fn default_version(&self) -> &'static str {
        "latest"
    }

    fn default_port(&self) -> u16 {
        3306
    }

    fn env_vars(&self, db_name: &str, auth: Option<&Credentials>) -> Vec<String> {
        let mut env = vec![format!("MYSQL_DATABASE={db_name}")];
        match auth {
            Some(creds) => {
                env.push(format!("MYSQL_USER={}", creds.username));
                env.push(format!("MYSQL_PASSWORD={}", creds.password));
                env.push(format!("MYSQL_ROOT_PASSWORD={ROOT_PASSWORD}"));
            }
            None => env.push("MYSQL_ALLOW_EMPTY_PASSWORD=yes".to_string()),
        }
        env
    }

    fn supports_username(&self) -> bool {
        true
    }

    fn data_path(&self) -> &'static str {
        "/var/lib/mysql"
    }

    fn config_path(&self) -> &'static str {
        "/etc/mysql/conf.d"
    }

    fn config_file_name(&self) -> &'static str {
        "my.cnf"
    }

    fn default_config(&self) -> &'static str {
        r#"# MySQL configuration file
# Managed by mkdb

[mysqld]
# Connection Settings
max_connections = 100

# Logging
general_log = 1
general_log_file = /var/log/mysql/general.log
"#
    }

    fn create_user_command(
        &self,
        username: &str,
        password: &str,
        db_name: &str,
    ) -> Option<Vec<String>> {
        Some(mysql_root(&format!(
            "CREATE USER '{username}'@'%' IDENTIFIED BY '{password}'; GRANT ALL PRIVILEGES ON `{db_name}`.* TO '{username}'@'%'; FLUSH PRIVILEGES;"
        )))
    }

    fn delete_user_command(&self, username: &str, _db_name: &str) -> Option<Vec<String>> {
        Some(mysql_root(&format!(
            "DROP USER IF EXISTS '{username}'@'%'; FLUSH PRIVILEGES;"
        )))
    }

    fn rotate_password_command(
        &self,
        username: &str,
        new_password: &str,
        _db_name: &str,
    ) -> Option<Vec<String>> {
        Some(mysql_root(&format!(
            "ALTER USER '{username}'@'%' IDENTIFIED BY '{new_password}'; FLUSH PRIVILEGES;"
        )))
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
                "mysql://{}:{}@tcp({host}:{port})/{db_name}",
                creds.username, creds.password
            ),
            None => format!("mysql://root@tcp({host}:{port})/{db_name}"),
        }
    }

    fn version_command(&self) -> Option<Vec<String>> {
        Some(args(&["mysqld", "--version"]))
    }

    fn parse_version(&self, output: &str) -> String {
        // mysqld  Ver 8.0.35 for Linux on x86_64 (MySQL Community Server - GPL)
        version_after(output, "Ver").unwrap_or_else(|| output.trim().to_string())
    }

    fn ping_command(&self, auth: Option<&Credentials>, db_name: &str) -> Option<Vec<String>> {
        let mut cmd = args(&["mysql"]);
        match auth {
            Some(creds) => {
                cmd.push("-u".into());
                cmd.push(creds.username.clone());
                cmd.push(format!("-p{}", creds.password));
            }
            None => cmd.extend(args(&["-u", "root"])),
        }
        cmd.push(db_name.to_string());
        cmd.push("-e".into());
        cmd.push("SELECT 1 as status, USER() as user, DATABASE() as db;".into());
        Some(cmd)
    }
}

fn mysql_root(sql: &str) -> Vec<String> {
    vec![
        "mysql".into(),
        "-u".into(),
        "root".into(),
        format!("-p{ROOT_PASSWORD}"),
        "-e".into(),
        sql.into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mysqld_banner() {
        let adapter = MySqlAdapter;
        assert_eq!(
            adapter.parse_version(
                "mysqld  Ver 8.0.35 for Linux on x86_64 (MySQL Community Server - GPL)"
            ),
            "8.0.35"
        );
    }

    #[test]
    fn unauthenticated_mode_allows_empty_root_password() {
        let adapter = MySqlAdapter;
        let env = adapter.env_vars("devdb", None);
        assert_eq!(
            env,
            vec![
                "MYSQL_DATABASE=devdb".to_string(),
                "MYSQL_ALLOW_EMPTY_PASSWORD=yes".to_string()
            ]
        );
        assert_eq!(
            adapter.connection_string(None, "localhost", 3306, "devdb"),
            "mysql://root@tcp(localhost:3306)/devdb"
        );
    }

    #[test]
    fn create_user_grants_on_database() {
        let cmd = MySqlAdapter
            .create_user_command("app", "secret", "devdb")
            .unwrap();
        assert_eq!(cmd[0], "mysql");
        assert!(cmd.last().unwrap().contains("GRANT ALL PRIVILEGES ON `devdb`.* TO 'app'@'%'"));
    }
}
