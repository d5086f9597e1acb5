//! Database-type capabilities.
//!
//! Everything that differs between Postgres, MySQL and Redis lives behind
//! [`DatabaseAdapter`]; the rest of the crate only talks to the trait.

mod mysql;
mod postgres;
mod redis;
mod registry;

pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use redis::RedisAdapter;
pub use registry::AdapterRegistry;

use crate::credentials::Credentials;
use std::fmt::Debug;

pub trait DatabaseAdapter: Send + Sync + Debug {
    /// Canonical type name stored in container records
    fn name(&self) -> &'static str;

    /// Alternative names that resolve to this adapter
    fn aliases(&self) -> &'static [&'static str];

    fn image_repository(&self) -> &'static str;

    /// Tag used when the caller does not ask for a version
    fn default_version(&self) -> &'static str;

    fn image(&self, version: &str) -> String {
        let version = version.trim();
        let tag = if version.is_empty() {
            self.default_version()
        } else {
            version
        };
        format!("{}:{}", self.image_repository(), tag)
    }

    fn default_port(&self) -> u16;

    /// Environment for the container. `None` means unauthenticated mode.
    fn env_vars(&self, db_name: &str, auth: Option<&Credentials>) -> Vec<String>;

    /// Command override for the container; empty keeps the image default.
    fn command_args(&self, _auth: Option<&Credentials>) -> Vec<String> {
        Vec::new()
    }

    fn supports_username(&self) -> bool;

    /// Mount target for persistent data
    fn data_path(&self) -> &'static str;

    /// Mount target for the config directory
    fn config_path(&self) -> &'static str;

    fn config_file_name(&self) -> &'static str;

    fn default_config(&self) -> &'static str;

    /// `None` means the adapter cannot create users.
    fn create_user_command(
        &self,
        username: &str,
        password: &str,
        db_name: &str,
    ) -> Option<Vec<String>>;

    fn delete_user_command(&self, username: &str, db_name: &str) -> Option<Vec<String>>;

    fn rotate_password_command(
        &self,
        username: &str,
        new_password: &str,
        db_name: &str,
    ) -> Option<Vec<String>>;

    fn connection_string(
        &self,
        auth: Option<&Credentials>,
        host: &str,
        port: u16,
        db_name: &str,
    ) -> String;

    fn version_command(&self) -> Option<Vec<String>>;

    /// Extracts a clean version (`16.1`) from the probe output, falling back
    /// to the trimmed output.
    fn parse_version(&self, output: &str) -> String;

    /// Cheap query used to check that the server answers.
    fn ping_command(&self, auth: Option<&Credentials>, db_name: &str) -> Option<Vec<String>>;
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Token following `marker` in whitespace-split output, cut at the first `-`.
fn version_after(output: &str, marker: &str) -> Option<String> {
    let mut parts = output.split_whitespace();
    while let Some(part) = parts.next() {
        if part == marker {
            return parts.next().map(strip_suffix);
        }
    }
    None
}

fn strip_suffix(version: &str) -> String {
    version.split('-').next().unwrap_or(version).to_string()
}
