use crate::error::{Error, Result};
use crate::services::ContainerService;
use std::collections::HashSet;
use tracing::warn;

/// Ports probed by [`PortAllocator::find_available`], starting port included.
pub const PORT_SEARCH_SPAN: u16 = 100;

/// Port chosen for a new container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSelection {
    pub port: u16,
    /// The default port that was busy, when a substitute had to be picked
    pub substituted_from: Option<u16>,
}

/// Picks host ports that no running container publishes.
///
/// Usage is read from the runtime on every call; nothing is reserved, so two
/// concurrent invocations can still pick the same port.
pub struct PortAllocator<'a> {
    containers: &'a ContainerService,
}

impl<'a> PortAllocator<'a> {
    pub fn new(containers: &'a ContainerService) -> Self {
        Self { containers }
    }

    pub fn is_available(&self, port: u16) -> Result<bool> {
        Ok(!self.containers.published_ports()?.contains(&port))
    }

    pub fn find_available(&self, start: u16) -> Result<u16> {
        let used: HashSet<u16> = self.containers.published_ports()?.into_iter().collect();
        first_free(start, &used).ok_or_else(|| {
            Error::Conflict(format!(
                "nenhuma porta livre entre {start} e {}",
                start.saturating_add(PORT_SEARCH_SPAN - 1)
            ))
        })
    }

    /// An explicit port must be free; otherwise the default is used, or the
    /// next free port after it.
    pub fn resolve(&self, requested: Option<u16>, default: u16) -> Result<PortSelection> {
        if let Some(port) = requested {
            if !self.is_available(port)? {
                return Err(Error::Conflict(format!("porta {port} já está em uso")));
            }
            return Ok(PortSelection {
                port,
                substituted_from: None,
            });
        }

        let port = self.find_available(default)?;
        if port == default {
            return Ok(PortSelection {
                port,
                substituted_from: None,
            });
        }

        warn!("⚠️  Porta {default} em uso, usando {port}");
        Ok(PortSelection {
            port,
            substituted_from: Some(default),
        })
    }
}

fn first_free(start: u16, used: &HashSet<u16>) -> Option<u16> {
    (0..PORT_SEARCH_SPAN)
        .map_while(|offset| start.checked_add(offset))
        .find(|port| !used.contains(port))
}
