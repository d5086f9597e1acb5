use crate::domain::{Container, ContainerStatus, Event, EventKind, NewUser, User, VolumeKind};
use crate::error::{Error, Result, StorageContext};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS containers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL UNIQUE,
    db_type TEXT NOT NULL,
    version TEXT NOT NULL,
    container_id TEXT NOT NULL DEFAULT '',
    port INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    volume_type TEXT NOT NULL DEFAULT 'none',
    volume_path TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    container_id INTEGER NOT NULL REFERENCES containers(id) ON DELETE CASCADE,
    username TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(container_id, username)
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    container_id INTEGER NOT NULL REFERENCES containers(id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_containers_expires_at ON containers(expires_at);
CREATE INDEX IF NOT EXISTS idx_events_container ON events(container_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_default ON users(container_id) WHERE is_default = 1;
"#;

const CONTAINER_COLUMNS: &str = "id, name, display_name, db_type, version, container_id, port, \
     status, created_at, expires_at, volume_type, volume_path";

const USER_COLUMNS: &str = "id, container_id, username, password_hash, is_default, created_at";

/// SQLite-backed record of containers, their users and the event log.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .storage(&format!("abrindo banco de estado {}", path.display()))?;
        debug!("Banco de estado aberto em {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().storage("abrindo banco em memória")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .storage("habilitando chaves estrangeiras")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .storage("configurando busy_timeout")?;
        conn.execute_batch(SCHEMA).storage("criando esquema")?;
        Ok(Self { conn })
    }

    /// Inserts a container and its default user in one transaction.
    pub fn insert_container(&self, container: &Container, default_user: &NewUser) -> Result<Container> {
        let tx = self
            .conn
            .unchecked_transaction()
            .storage("iniciando transação")?;

        tx.execute(
            "INSERT INTO containers (name, display_name, db_type, version, container_id, port, \
             status, created_at, expires_at, volume_type, volume_path) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                container.name,
                container.display_name,
                container.db_type,
                container.version,
                container.container_id,
                container.port,
                container.status.as_str(),
                timestamp(container.created_at),
                timestamp(container.expires_at),
                container.volume_kind.as_str(),
                container.volume_ref,
            ],
        )
        .map_err(|e| constraint_or_storage(e, &container.display_name, "inserindo container"))?;
        let id = tx.last_insert_rowid();

        insert_user_row(&tx, id, default_user)
            .map_err(|e| constraint_or_storage(e, &default_user.username, "inserindo usuário padrão"))?;

        tx.commit().storage("confirmando transação")?;

        Ok(Container {
            id,
            ..container.clone()
        })
    }

    pub fn get_container(&self, id: i64) -> Result<Option<Container>> {
        self.query_container("id = ?1", params![id])
    }

    pub fn get_container_by_name(&self, name: &str) -> Result<Option<Container>> {
        self.query_container("name = ?1", params![name])
    }

    pub fn get_container_by_display_name(&self, display_name: &str) -> Result<Option<Container>> {
        self.query_container("display_name = ?1", params![display_name])
    }

    fn query_container(
        &self,
        condition: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<Container>> {
        let sql = format!("SELECT {CONTAINER_COLUMNS} FROM containers WHERE {condition}");
        self.conn
            .query_row(&sql, params, container_from_row)
            .optional()
            .storage("buscando container")
    }

    /// Records shown by default; rows left with the legacy `expired` status are hidden.
    pub fn list_containers(&self) -> Result<Vec<Container>> {
        self.query_containers(
            "WHERE status != 'expired' ORDER BY created_at DESC",
            params![],
        )
    }

    pub fn list_all_containers(&self) -> Result<Vec<Container>> {
        self.query_containers("ORDER BY created_at DESC", params![])
    }

    /// Records whose TTL has passed and that are neither stopped nor marked expired.
    pub fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Container>> {
        self.query_containers(
            "WHERE expires_at < ?1 AND status != 'stopped' AND status != 'expired' \
             ORDER BY expires_at ASC",
            params![timestamp(now)],
        )
    }

    fn query_containers(&self, clause: &str, params: impl rusqlite::Params) -> Result<Vec<Container>> {
        let sql = format!("SELECT {CONTAINER_COLUMNS} FROM containers {clause}");
        let mut stmt = self.conn.prepare(&sql).storage("listando containers")?;
        let rows = stmt
            .query_map(params, container_from_row)
            .storage("listando containers")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .storage("lendo containers")
    }

    /// Persists runtime id, status and expiry.
    pub fn update_container(&self, container: &Container) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE containers SET container_id = ?1, status = ?2, expires_at = ?3 WHERE id = ?4",
                params![
                    container.container_id,
                    container.status.as_str(),
                    timestamp(container.expires_at),
                    container.id,
                ],
            )
            .storage("atualizando container")?;

        if changed == 0 {
            return Err(Error::NotFound(format!(
                "container '{}'",
                container.display_name
            )));
        }
        Ok(())
    }

    /// Deletes the record; users and events go with it.
    pub fn delete_container(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM containers WHERE id = ?1", params![id])
            .storage("removendo container")?;
        Ok(())
    }

    pub fn insert_user(&self, container_ref: i64, user: &NewUser) -> Result<User> {
        insert_user_row(&self.conn, container_ref, user)
            .map_err(|e| constraint_or_storage(e, &user.username, "inserindo usuário"))?;
        let id = self.conn.last_insert_rowid();

        Ok(User {
            id,
            container_ref,
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            is_default: user.is_default,
            created_at: user.created_at,
        })
    }

    pub fn get_default_user(&self, container_ref: i64) -> Result<Option<User>> {
        let sql =
            format!("SELECT {USER_COLUMNS} FROM users WHERE container_id = ?1 AND is_default = 1");
        self.conn
            .query_row(&sql, params![container_ref], user_from_row)
            .optional()
            .storage("buscando usuário padrão")
    }

    pub fn find_user(&self, container_ref: i64, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE container_id = ?1 AND username = ?2");
        self.conn
            .query_row(&sql, params![container_ref, username], user_from_row)
            .optional()
            .storage("buscando usuário")
    }

    /// Users of a container, default user first.
    pub fn list_users(&self, container_ref: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE container_id = ?1 \
             ORDER BY is_default DESC, created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql).storage("listando usuários")?;
        let rows = stmt
            .query_map(params![container_ref], user_from_row)
            .storage("listando usuários")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .storage("lendo usuários")
    }

    pub fn update_user_password(&self, user_id: i64, password_hash: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![password_hash, user_id],
            )
            .storage("atualizando senha")?;
        Ok(())
    }

    pub fn delete_user(&self, user_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM users WHERE id = ?1", params![user_id])
            .storage("removendo usuário")?;
        Ok(())
    }

    pub fn insert_event(
        &self,
        container_ref: i64,
        kind: EventKind,
        at: DateTime<Utc>,
        details: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO events (container_id, event_type, timestamp, details) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![container_ref, kind.as_str(), timestamp(at), details],
            )
            .storage("registrando evento")?;
        Ok(())
    }

    /// Events of a container, oldest first.
    pub fn list_events(&self, container_ref: i64) -> Result<Vec<Event>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, container_id, event_type, timestamp, details FROM events \
                 WHERE container_id = ?1 ORDER BY timestamp ASC, id ASC",
            )
            .storage("listando eventos")?;
        let rows = stmt
            .query_map(params![container_ref], |row| {
                Ok(Event {
                    id: row.get(0)?,
                    container_ref: row.get(1)?,
                    kind: parse_column(row, 2)?,
                    timestamp: timestamp_column(row, 3)?,
                    details: row.get(4)?,
                })
            })
            .storage("listando eventos")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .storage("lendo eventos")
    }
}

/// Fixed-width UTC text so lexical order matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn insert_user_row(conn: &Connection, container_ref: i64, user: &NewUser) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO users (container_id, username, password_hash, is_default, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            container_ref,
            user.username,
            user.password_hash,
            user.is_default,
            timestamp(user.created_at),
        ],
    )
}

fn constraint_or_storage(err: rusqlite::Error, subject: &str, context: &str) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Error::Conflict(format!("'{subject}' já existe"))
        }
        _ => Error::Storage {
            context: context.to_string(),
            source: err,
        },
    }
}

fn container_from_row(row: &Row<'_>) -> rusqlite::Result<Container> {
    Ok(Container {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        db_type: row.get(3)?,
        version: row.get(4)?,
        container_id: row.get(5)?,
        port: row.get(6)?,
        status: parse_column::<ContainerStatus>(row, 7)?,
        created_at: timestamp_column(row, 8)?,
        expires_at: timestamp_column(row, 9)?,
        volume_kind: parse_column::<VolumeKind>(row, 10)?,
        volume_ref: row.get(11)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        container_ref: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        is_default: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn container(display: &str, expires_in_hours: i64) -> Container {
        Container {
            id: 0,
            name: Container::internal_name(display),
            display_name: display.to_string(),
            db_type: "postgres".into(),
            version: "18".into(),
            container_id: format!("rt-{display}"),
            port: 5432,
            status: ContainerStatus::Running,
            created_at: now(),
            expires_at: now() + Duration::hours(expires_in_hours),
            volume_kind: VolumeKind::None,
            volume_ref: String::new(),
        }
    }

    fn default_user() -> NewUser {
        NewUser {
            username: "dbuser".into(),
            password_hash: "cafebabe".into(),
            is_default: true,
            created_at: now(),
        }
    }

    #[test]
    fn insert_stores_container_with_default_user() {
        let store = Store::open_in_memory().unwrap();
        let saved = store.insert_container(&container("devdb", 2), &default_user()).unwrap();

        let loaded = store.get_container_by_display_name("devdb").unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.expires_at, now() + Duration::hours(2));

        let user = store.get_default_user(saved.id).unwrap().unwrap();
        assert_eq!(user.username, "dbuser");
        assert!(user.is_default);
    }

    #[test]
    fn duplicate_display_name_is_a_conflict_and_leaves_no_user() {
        let store = Store::open_in_memory().unwrap();
        store.insert_container(&container("devdb", 2), &default_user()).unwrap();

        let err = store
            .insert_container(&container("devdb", 2), &default_user())
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.list_all_containers().unwrap().len(), 1);
    }

    #[test]
    fn delete_cascades_to_users_and_events() {
        let store = Store::open_in_memory().unwrap();
        let saved = store.insert_container(&container("devdb", 2), &default_user()).unwrap();
        store
            .insert_event(saved.id, EventKind::Created, now(), "postgres:18")
            .unwrap();

        store.delete_container(saved.id).unwrap();

        assert!(store.get_container(saved.id).unwrap().is_none());
        assert!(store.list_users(saved.id).unwrap().is_empty());
        assert!(store.list_events(saved.id).unwrap().is_empty());
    }

    #[test]
    fn expired_query_skips_stopped_and_future_records() {
        let store = Store::open_in_memory().unwrap();
        let overdue = store.insert_container(&container("old", -1), &default_user()).unwrap();
        store.insert_container(&container("fresh", 3), &default_user()).unwrap();

        let mut stopped = store.insert_container(&container("paused", -1), &default_user()).unwrap();
        stopped.status = ContainerStatus::Stopped;
        stopped.container_id.clear();
        store.update_container(&stopped).unwrap();

        let expired = store.get_expired(now()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, overdue.id);
    }

    #[test]
    fn username_is_unique_per_container() {
        let store = Store::open_in_memory().unwrap();
        let saved = store.insert_container(&container("devdb", 2), &default_user()).unwrap();

        let extra = NewUser {
            username: "dbuser".into(),
            password_hash: "00".into(),
            is_default: false,
            created_at: now(),
        };
        assert!(store.insert_user(saved.id, &extra).unwrap_err().is_conflict());
    }

    #[test]
    fn second_default_user_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let saved = store.insert_container(&container("devdb", 2), &default_user()).unwrap();

        let rival = NewUser {
            username: "admin".into(),
            ..default_user()
        };
        assert!(store.insert_user(saved.id, &rival).unwrap_err().is_conflict());
        assert_eq!(store.list_users(saved.id).unwrap().len(), 1);
    }
}
