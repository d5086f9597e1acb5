use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::str::FromStr;

/// Prefix applied to every runtime container name managed by mkdb.
pub const CONTAINER_PREFIX: &str = "mkdb-";

/// Status as persisted in the store.
///
/// `Expired` is only read back from rows written by older versions; new code
/// never writes it because expiration is computed, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Stopped,
    Expired,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "expired" => Ok(Self::Expired),
            other => Err(format!("status desconhecido: {other}")),
        }
    }
}

/// Status shown to the user, computed at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    Running,
    Stopped,
    Expired,
    Removed,
}

impl DisplayStatus {
    /// Parses a user-supplied status filter, accepting `up`/`down` aliases.
    pub fn parse_filter(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" | "running" => Some(Self::Running),
            "down" | "stopped" => Some(Self::Stopped),
            "expired" => Some(Self::Expired),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Expired => "expired",
            Self::Removed => "removed",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    None,
    Named,
    Bind,
}

impl VolumeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Named => "named",
            Self::Bind => "bind",
        }
    }
}

impl FromStr for VolumeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Self::None),
            "named" => Ok(Self::Named),
            "bind" => Ok(Self::Bind),
            other => Err(format!("tipo de volume desconhecido: {other}")),
        }
    }
}

/// A managed database instance as recorded in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub db_type: String,
    pub version: String,
    /// Runtime instance id; empty while no runtime container exists.
    pub container_id: String,
    pub port: u16,
    pub status: ContainerStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub volume_kind: VolumeKind,
    /// Volume name for named volumes, host path for bind volumes.
    pub volume_ref: String,
}

impl Container {
    pub fn internal_name(display_name: &str) -> String {
        format!("{CONTAINER_PREFIX}{display_name}")
    }

    pub fn has_runtime_instance(&self) -> bool {
        !self.container_id.is_empty()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at && self.status != ContainerStatus::Stopped
    }

    pub fn display_status(&self, now: DateTime<Utc>) -> DisplayStatus {
        if self.is_expired(now) {
            return DisplayStatus::Expired;
        }
        match self.status {
            ContainerStatus::Running => DisplayStatus::Running,
            ContainerStatus::Stopped => DisplayStatus::Stopped,
            ContainerStatus::Expired => DisplayStatus::Expired,
        }
    }
}

/// New expiry after extending by `hours`.
///
/// Overdue records restart the clock from `now` so the time they spent expired
/// is not credited back; records still within their TTL extend additively.
/// `None` when the result does not fit in a timestamp.
pub fn extended_expiry(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    hours: i64,
) -> Option<DateTime<Utc>> {
    let base = if expires_at < now { now } else { expires_at };
    base.checked_add_signed(TimeDelta::try_hours(hours)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub container_ref: i64,
    pub username: String,
    /// Hex-encoded AES-GCM ciphertext of the password; empty without auth.
    pub password_hash: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_unauthenticated(&self) -> bool {
        self.username.is_empty() && self.password_hash.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Stopped,
    Restarted,
    TtlExtended,
    Restored,
    Deleted,
    Expired,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Stopped => "stopped",
            Self::Restarted => "restarted",
            Self::TtlExtended => "ttl_extended",
            Self::Restored => "restored",
            Self::Deleted => "deleted",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "stopped" => Ok(Self::Stopped),
            "restarted" => Ok(Self::Restarted),
            "ttl_extended" => Ok(Self::TtlExtended),
            "restored" => Ok(Self::Restored),
            "deleted" => Ok(Self::Deleted),
            "expired" => Ok(Self::Expired),
            other => Err(format!("evento desconhecido: {other}")),
        }
    }
}

/// Audit entry. Written once, shown to the user, never used for decisions.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub container_ref: i64,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample(status: ContainerStatus, expires_at: DateTime<Utc>) -> Container {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        Container {
            id: 1,
            name: Container::internal_name("devdb"),
            display_name: "devdb".into(),
            db_type: "postgres".into(),
            version: "18".into(),
            container_id: String::new(),
            port: 5432,
            status,
            created_at: created,
            expires_at,
            volume_kind: VolumeKind::None,
            volume_ref: String::new(),
        }
    }

    #[test]
    fn extend_not_yet_due_adds_to_old_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let expires = now + Duration::hours(1);
        assert_eq!(extended_expiry(expires, now, 3), Some(expires + Duration::hours(3)));
    }

    #[test]
    fn extend_overdue_counts_from_now() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let expires = now - Duration::hours(5);
        assert_eq!(extended_expiry(expires, now, 2), Some(now + Duration::hours(2)));
    }

    #[test]
    fn extend_past_the_representable_range_is_none() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(extended_expiry(now, now, i64::MAX), None);
        assert_eq!(extended_expiry(now, now, i64::MAX / 1000), None);
    }

    #[test]
    fn stopped_records_never_display_as_expired() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let past = now - Duration::hours(1);

        assert_eq!(
            sample(ContainerStatus::Running, past).display_status(now),
            DisplayStatus::Expired
        );
        assert_eq!(
            sample(ContainerStatus::Stopped, past).display_status(now),
            DisplayStatus::Stopped
        );
    }

    #[test]
    fn status_filter_accepts_aliases() {
        assert_eq!(DisplayStatus::parse_filter("UP"), Some(DisplayStatus::Running));
        assert_eq!(DisplayStatus::parse_filter("down"), Some(DisplayStatus::Stopped));
        assert_eq!(DisplayStatus::parse_filter("gone"), None);
    }
}
