use crate::domain::{Container, VolumeKind};
use crate::error::{Error, Result};
use crate::infra::DataPaths;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Storage asked for at create time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeRequest {
    None,
    Named,
    Bind(PathBuf),
}

impl FromStr for VolumeRequest {
    type Err = Error;

    /// `none` and `named` are keywords; anything else is a bind path.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "named" => Ok(Self::Named),
            _ => Ok(Self::Bind(PathBuf::from(s))),
        }
    }
}

impl VolumeRequest {
    /// Text form, parseable back with `FromStr`.
    pub fn as_setting(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Named => "named".to_string(),
            Self::Bind(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVolume {
    pub kind: VolumeKind,
    /// Stored in the record: volume name or bind path
    pub reference: String,
    pub host_path: Option<PathBuf>,
    /// `resolve` made `host_path` itself; it did not exist before
    pub created: bool,
}

impl ResolvedVolume {
    pub fn none() -> Self {
        Self {
            kind: VolumeKind::None,
            reference: String::new(),
            host_path: None,
            created: false,
        }
    }

    /// `host:target` mount argument, if there is anything to mount.
    pub fn mount(&self, target: &str) -> Option<String> {
        self.host_path
            .as_ref()
            .map(|path| format!("{}:{target}", path.display()))
    }
}

/// Named-volume directory no active record refers to.
#[derive(Debug, Clone)]
pub struct OrphanedVolume {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Last known record with this volume, when the store still has one
    pub previous: Option<Container>,
}

pub struct VolumeService<'a> {
    paths: &'a DataPaths,
}

impl<'a> VolumeService<'a> {
    pub fn new(paths: &'a DataPaths) -> Self {
        Self { paths }
    }

    pub fn named_path(&self, name: &str) -> PathBuf {
        self.paths.volumes().join(name)
    }

    /// Turns a request into a host directory, creating it when missing.
    pub fn resolve(&self, request: &VolumeRequest, display_name: &str) -> Result<ResolvedVolume> {
        match request {
            VolumeRequest::None => Ok(ResolvedVolume::none()),
            VolumeRequest::Named => {
                let path = self.named_path(display_name);
                let created = !path.exists();
                create_dir(&path)?;
                Ok(ResolvedVolume {
                    kind: VolumeKind::Named,
                    reference: display_name.to_string(),
                    host_path: Some(path),
                    created,
                })
            }
            VolumeRequest::Bind(raw) => {
                let path = expand_bind_path(raw)?;
                let created = !path.exists();
                create_dir(&path)?;
                Ok(ResolvedVolume {
                    kind: VolumeKind::Bind,
                    reference: path.display().to_string(),
                    host_path: Some(path),
                    created,
                })
            }
        }
    }

    /// Undoes `resolve` after a failed create. Only a directory `resolve`
    /// made itself is deleted.
    pub fn release(&self, volume: &ResolvedVolume) {
        let Some(path) = volume.host_path.as_ref().filter(|_| volume.created) else {
            return;
        };
        match fs::remove_dir_all(path) {
            Ok(_) => debug!("{} descartado", path.display()),
            Err(e) => warn!("⚠️  Não foi possível apagar {}: {e}", path.display()),
        }
    }

    /// Rebuilds the mount for an existing record.
    pub fn for_record(&self, container: &Container) -> ResolvedVolume {
        match container.volume_kind {
            VolumeKind::None => ResolvedVolume::none(),
            VolumeKind::Named => ResolvedVolume {
                kind: VolumeKind::Named,
                reference: container.volume_ref.clone(),
                host_path: Some(self.named_path(&container.volume_ref)),
                created: false,
            },
            VolumeKind::Bind => ResolvedVolume {
                kind: VolumeKind::Bind,
                reference: container.volume_ref.clone(),
                host_path: Some(PathBuf::from(&container.volume_ref)),
                created: false,
            },
        }
    }

    /// Volume directories not referenced by any active named-volume record,
    /// paired with historical metadata from `all` when available.
    pub fn scan_orphaned(
        &self,
        active: &[Container],
        all: &[Container],
    ) -> Result<Vec<OrphanedVolume>> {
        let root = self.paths.volumes();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let in_use: HashSet<&str> = active
            .iter()
            .filter(|c| c.volume_kind == VolumeKind::Named)
            .map(|c| c.volume_ref.as_str())
            .collect();

        let mut history: HashMap<&str, &Container> = HashMap::new();
        for c in all.iter().filter(|c| c.volume_kind == VolumeKind::Named) {
            // `all` is newest first; keep the most recent record per volume.
            history.entry(c.volume_ref.as_str()).or_insert(c);
        }

        let entries = fs::read_dir(&root)
            .map_err(|e| Error::io(format!("lendo {}", root.display()), e))?;

        let mut orphans = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(format!("lendo {}", root.display()), e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if in_use.contains(name.as_str()) {
                continue;
            }

            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);

            orphans.push(OrphanedVolume {
                size_bytes: dir_size(&path),
                previous: history.get(name.as_str()).map(|c| (*c).clone()),
                name,
                path,
                modified,
            });
        }

        orphans.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("{} volume(s) órfão(s) encontrados", orphans.len());
        Ok(orphans)
    }

    /// Deletes a named volume directory. Returns false if it did not exist.
    pub fn purge(&self, name: &str) -> Result<bool> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(Error::Validation(format!("nome de volume inválido: '{name}'")));
        }

        let path = self.named_path(name);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&path)
            .map_err(|e| Error::io(format!("removendo {}", path.display()), e))?;
        info!("🗑️  Volume {name} apagado");
        Ok(true)
    }
}

fn expand_bind_path(raw: &Path) -> Result<PathBuf> {
    let text = raw.to_string_lossy();
    let expanded = PathBuf::from(shellexpand::tilde(&text).into_owned());
    std::path::absolute(&expanded)
        .map_err(|e| Error::io(format!("resolvendo {}", expanded.display()), e))
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::io(format!("criando {}", path.display()), e))
}

/// Recursive size; unreadable entries count as zero.
fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };

    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(ft) if ft.is_dir() => dir_size(&entry.path()),
            Ok(_) => entry.metadata().map(|m| m.len()).unwrap_or(0),
            Err(_) => 0,
        })
        .sum()
}
