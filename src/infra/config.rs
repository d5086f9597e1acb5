use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DB_FILE_NAME: &str = "mkdb.db";
pub const KEY_FILE_NAME: &str = ".encryption.key";
pub const CONFIG_FILE_NAME: &str = "mkdb.toml";
pub const LAST_SETTINGS_FILE_NAME: &str = "last_settings.toml";
pub const LOG_FILE_NAME: &str = "mkdb.log";

pub const DEFAULT_TTL_HOURS: i64 = 2;
pub const DEFAULT_HOST: &str = "localhost";

/// Data directory when none is given: `$XDG_DATA_HOME/mkdb`, else
/// `$HOME/.local/share/mkdb`.
pub fn default_data_dir() -> PathBuf {
    data_dir_from(
        std::env::var_os("XDG_DATA_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn data_dir_from(xdg_data_home: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    match xdg_data_home.filter(|p| !p.as_os_str().is_empty()) {
        Some(xdg) => xdg.join("mkdb"),
        None => home
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".local/share/mkdb"),
    }
}

/// Filesystem layout under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database(&self) -> PathBuf {
        self.root.join(DB_FILE_NAME)
    }

    pub fn encryption_key(&self) -> PathBuf {
        self.root.join(KEY_FILE_NAME)
    }

    pub fn volumes(&self) -> PathBuf {
        self.root.join("volumes")
    }

    pub fn configs(&self) -> PathBuf {
        self.root.join("configs")
    }

    /// Config directory mounted into the container named `name`.
    pub fn container_config_dir(&self, name: &str) -> PathBuf {
        self.configs().join(name)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn last_settings(&self) -> PathBuf {
        self.root.join(LAST_SETTINGS_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join(LOG_FILE_NAME)
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [self.root.clone(), self.volumes(), self.configs()] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct RuntimeConfig {
    /// `podman` unless set; any docker-compatible CLI works
    pub binary: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DefaultsConfig {
    pub ttl_hours: i64,
    pub host: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            ttl_hours: DEFAULT_TTL_HOURS,
            host: DEFAULT_HOST.to_string(),
        }
    }
}

/// Optional `mkdb.toml` in the data directory.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct MkdbConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl MkdbConfig {
    /// Loads the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Sem {:?}, usando configuração padrão", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).with_context(|| format!("lendo {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("parseando {:?}", path))
    }
}

/// Parameters of the last successful `start`, replayed by `start --repeat`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LastSettings {
    pub db_type: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub port: Option<u16>,
    #[serde(default = "default_volume")]
    pub volume: String,
    pub ttl_hours: i64,
    #[serde(default)]
    pub no_auth: bool,
}

fn default_volume() -> String {
    "none".to_string()
}

impl LastSettings {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).with_context(|| format!("lendo {:?}", path))?;
        let settings = toml::from_str(&content).with_context(|| format!("parseando {:?}", path))?;
        Ok(Some(settings))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string(self).context("serializando últimas configurações")?;
        fs::write(path, content).with_context(|| format!("gravando {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn xdg_data_home_wins_over_home() {
        assert_eq!(
            data_dir_from(Some("/xdg".into()), Some("/home/ana".into())),
            PathBuf::from("/xdg/mkdb")
        );
        assert_eq!(
            data_dir_from(None, Some("/home/ana".into())),
            PathBuf::from("/home/ana/.local/share/mkdb")
        );
        assert_eq!(
            data_dir_from(Some("".into()), Some("/home/ana".into())),
            PathBuf::from("/home/ana/.local/share/mkdb")
        );
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MkdbConfig::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config.defaults.ttl_hours, 2);
        assert_eq!(config.defaults.host, "localhost");
        assert!(config.runtime.binary.is_none());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[runtime]\nbinary = \"docker\"\n\n[defaults]\nttl_hours = 8\n").unwrap();

        let config = MkdbConfig::load(&path).unwrap();
        assert_eq!(config.runtime.binary.as_deref(), Some("docker"));
        assert_eq!(config.defaults.ttl_hours, 8);
        assert_eq!(config.defaults.host, "localhost");
    }

    #[test]
    fn last_settings_survive_a_save_and_load() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path());
        paths.ensure().unwrap();
        assert!(LastSettings::load(&paths.last_settings()).unwrap().is_none());

        let settings = LastSettings {
            db_type: "postgres".into(),
            name: "devdb".into(),
            version: "16".into(),
            port: None,
            volume: "named".into(),
            ttl_hours: 4,
            no_auth: false,
        };
        settings.save(&paths.last_settings()).unwrap();

        assert_eq!(LastSettings::load(&paths.last_settings()).unwrap(), Some(settings));
    }
}
