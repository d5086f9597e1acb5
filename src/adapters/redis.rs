use super::{DatabaseAdapter, args, strip_suffix};
use crate::credentials::Credentials;

#[derive(Debug, Default)]
pub struct RedisAdapter;

impl DatabaseAdapter for RedisAdapter {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["redis"]
    }

    fn image_repository(&self) -> &'static str {
        "redis"
    }

    fn default_version(&self) -> &'static str {
        "8"
    }

    fn default_port(&self) -> u16 {
        6379
    }

    // The official image takes auth from the command line, not the environment.
    fn env_vars(&self, _db_name: &str, _auth: Option<&Credentials>) -> Vec<String> {
        Vec::new()
    }

    fn command_args(&self, auth: Option<&Credentials>) -> Vec<String> {
        match auth {
            Some(creds) if !creds.password.is_empty() => {
                vec![
                    "redis-server".into(),
                    "--requirepass".into(),
                    creds.password.clone(),
                ]
            }
            _ => Vec::new(),
        }
    }

    fn supports_username(&self) -> bool {
        false
    }

    fn data_path(&self) -> &'static str {
        "/data"
    }

    fn config_path(&self) -> &'static str {
        "/usr/local/etc/redis"
    }

    fn config_file_name(&self) -> &'static str {
        "redis.conf"
    }

    fn default_config(&self) -> &'static str {
        r#"# Redis configuration file
# Managed by mkdb

# Network
bind 0.0.0.0
port 6379

# Logging
loglevel notice

# Authentication
# Password is set on the command line
"#
    }

    fn create_user_command(&self, _: &str, _: &str, _: &str) -> Option<Vec<String>> {
        None
    }

    fn delete_user_command(&self, _: &str, _: &str) -> Option<Vec<String>> {
        None
    }

    fn rotate_password_command(&self, _: &str, _: &str, _: &str) -> Option<Vec<String>> {
        None
    }

    fn connection_string(
        &self,
        auth: Option<&Credentials>,
        host: &str,
        port: u16,
        _db_name: &str,
    ) -> String {
        // Logical database 0; pre-ACL redis has no username.
        match auth {
            Some(creds) if !creds.password.is_empty() => {
                format!("redis://:{}@{host}:{port}/0", creds.password)
            }
            _ => format!("redis://{host}:{port}/0"),
        }
    }

    fn version_command(&self) -> Option<Vec<String>> {
        Some(args(&["redis-server", "--version"]))
    }

    fn parse_version(&self, output: &str) -> String {
        // Redis server v=7.2.3 sha=00000000:0 malloc=jemalloc-5.3.0 bits=64
        output
            .split_whitespace()
            .find_map(|part| part.strip_prefix("v="))
            .map(strip_suffix)
            .unwrap_or_else(|| output.trim().to_string())
    }

    fn ping_command(&self, auth: Option<&Credentials>, _db_name: &str) -> Option<Vec<String>> {
        let mut cmd = args(&["redis-cli"]);
        if let Some(creds) = auth.filter(|c| !c.password.is_empty()) {
            cmd.push("-a".into());
            cmd.push(creds.password.clone());
        }
        cmd.push("PING".into());
        Some(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_management_is_not_offered() {
        let adapter = RedisAdapter;
        assert!(adapter.create_user_command("u", "p", "db").is_none());
        assert!(adapter.delete_user_command("u", "db").is_none());
        assert!(adapter.rotate_password_command("u", "p", "db").is_none());
    }

    #[test]
    fn password_goes_on_the_command_line() {
        let creds = Credentials::new("dbuser", "s3cret");
        assert_eq!(
            RedisAdapter.command_args(Some(&creds)),
            vec!["redis-server", "--requirepass", "s3cret"]
        );
        assert!(RedisAdapter.command_args(None).is_empty());
    }

    #[test]
    fn connection_string_with_and_without_password() {
        let creds = Credentials::new("dbuser", "s3cret");
        assert_eq!(
            RedisAdapter.connection_string(Some(&creds), "localhost", 6380, "cache"),
            "redis://:s3cret@localhost:6380/0"
        );
        assert_eq!(
            RedisAdapter.connection_string(None, "localhost", 6379, "cache"),
            "redis://localhost:6379/0"
        );
    }

    #[test]
    fn parses_version_banner() {
        assert_eq!(
            RedisAdapter.parse_version(
                "Redis server v=7.2.3 sha=00000000:0 malloc=jemalloc-5.3.0 bits=64 build=7504b1fedf883f2f"
            ),
            "7.2.3"
        );
    }
}
