//! Database handle lifecycle and operations

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::config::ConfigEntries;
use crate::error::{ImpostError, Result};
use crate::locate::DatabaseLocation;
use crate::message::{IndexedMessage, Message};
use crate::query::Query;
use crate::schema::{Schema, SCHEMA_VERSION};

/// Directory under the database root that marks it as a database and
/// holds the engine file.
pub(crate) const MARKER_DIR: &str = ".impost";

const ENGINE_FILE: &str = "index.db";

/// Access mode, chosen at open time and immutable for the handle's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseMode {
    ReadOnly,
    ReadWrite,
}

/// An open mail-index database.
///
/// Owns exactly one native engine connection. After [`Database::close`]
/// (or drop) the connection is released; every further operation except
/// another `close` returns [`ImpostError::Closed`].
pub struct Database {
    path: PathBuf,
    mode: DatabaseMode,
    conn: Option<Connection>,
    version: u32,
    last_status: Mutex<String>,
}

pub(crate) fn engine_file(root: &Path) -> PathBuf {
    root.join(MARKER_DIR).join(ENGINE_FILE)
}

pub(crate) fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

impl Database {
    /// Open an existing database rooted at `path`.
    pub fn open(path: impl AsRef<Path>, mode: DatabaseMode) -> Result<Self> {
        let path = absolutize(path.as_ref())?;
        let file = engine_file(&path);
        if !file.is_file() {
            return Err(ImpostError::NotFound);
        }
        let flags = match mode {
            DatabaseMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            DatabaseMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
        };
        let conn = Connection::open_with_flags(&file, flags).map_err(ImpostError::from_native)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(ImpostError::from_native)?;
        let version = read_version(&conn)?;
        debug!(path = %path.display(), ?mode, version, "opened database");
        Ok(Self {
            path,
            mode,
            conn: Some(conn),
            version,
            last_status: Mutex::new(String::new()),
        })
    }

    /// Create a new database rooted at `path` and return a read-write
    /// handle. The directory must exist and must not already contain a
    /// database.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = absolutize(path.as_ref())?;
        if !path.is_dir() {
            return Err(ImpostError::Database(format!(
                "not a directory: {}",
                path.display()
            )));
        }
        let marker = path.join(MARKER_DIR);
        if engine_file(&path).exists() {
            return Err(ImpostError::Database(format!(
                "database already exists at {}",
                marker.display()
            )));
        }
        fs::create_dir_all(&marker)?;
        let conn = Connection::open(engine_file(&path)).map_err(ImpostError::from_native)?;
        conn.execute_batch(Schema::create_tables())
            .map_err(ImpostError::from_native)?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )
        .map_err(ImpostError::from_native)?;
        info!(path = %path.display(), "created database");
        Ok(Self {
            path,
            mode: DatabaseMode::ReadWrite,
            conn: Some(conn),
            version: SCHEMA_VERSION,
            last_status: Mutex::new(String::new()),
        })
    }

    /// Open a database resolved from an explicit path, an explicit
    /// config file, or a named profile, in that order of precedence.
    ///
    /// The config home for profile resolution comes from the
    /// `XDG_CONFIG_HOME` environment variable when set, else the
    /// platform default. See [`DatabaseLocation`] for the deterministic,
    /// environment-free form.
    pub fn open_with_config(
        path: Option<&Path>,
        config_file: Option<&Path>,
        profile: Option<&str>,
        mode: DatabaseMode,
    ) -> Result<Self> {
        DatabaseLocation::from_env(path, config_file, profile).open(mode)
    }

    /// Release the native connection. Idempotent: further calls (and
    /// calls after a failed operation) are no-ops.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((conn, err)) = conn.close() {
                self.record_status(&err.to_string());
                drop(conn);
            }
            debug!(path = %self.path.display(), "closed database");
        }
    }

    /// Absolute filesystem path this handle was opened against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access mode fixed at open time.
    pub fn mode(&self) -> DatabaseMode {
        self.mode
    }

    /// On-disk schema version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// True iff the on-disk schema predates the current version.
    pub fn needs_upgrade(&self) -> bool {
        self.version < SCHEMA_VERSION
    }

    /// Migrate the on-disk schema to the current version.
    ///
    /// Fails with [`ImpostError::ReadOnly`] on a read-only handle; succeeds
    /// without touching anything when the schema is already current.
    pub fn upgrade(&mut self) -> Result<()> {
        if self.mode == DatabaseMode::ReadOnly {
            return Err(ImpostError::ReadOnly);
        }
        let mut version = self.version;
        {
            let conn = self.conn()?;
            while version < SCHEMA_VERSION {
                if let Some(migration) = Schema::migration(version, version + 1) {
                    conn.execute_batch(migration)
                        .map_err(|e| self.native_err(e))?;
                }
                version += 1;
                conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
                    .map_err(|e| self.native_err(e))?;
                info!(path = %self.path.display(), version, "upgraded database schema");
            }
        }
        self.version = version;
        Ok(())
    }

    /// Most recent native diagnostic string; empty if no failure has
    /// been recorded. Diagnostics only, never control flow.
    pub fn last_status(&self) -> String {
        match self.last_status.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Index the mail file at `filename`.
    ///
    /// A duplicate message id is not fatal: the filename is associated
    /// with the existing message and a usable handle is returned.
    pub fn add_message(&self, filename: impl AsRef<Path>) -> Result<Message<'_>> {
        let filename = absolutize(filename.as_ref())?;
        let conn = self.require_writable()?;
        let indexed = IndexedMessage::from_file(&filename)?;
        let to_json =
            serde_json::to_string(&indexed.to).map_err(|e| ImpostError::Database(e.to_string()))?;
        let inserted = conn.execute(
            "INSERT INTO messages (message_id, subject, from_address, to_addresses, date, body_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                indexed.message_id,
                indexed.subject,
                indexed.from,
                to_json,
                indexed.date,
                indexed.body_text,
            ],
        );
        if let Err(err) = inserted {
            match self.native_err(err) {
                ImpostError::DuplicateMessageId(_) => {
                    debug!(message_id = %indexed.message_id, "message already indexed");
                }
                other => return Err(other),
            }
        }
        conn.execute(
            "INSERT OR REPLACE INTO message_files (filename, message_id) VALUES (?1, ?2)",
            rusqlite::params![filename.to_string_lossy().into_owned(), indexed.message_id],
        )
        .map_err(|e| self.native_err(e))?;
        Ok(Message::new(self, indexed.message_id))
    }

    /// Remove the filename's association. The message itself (and its
    /// tags) goes away when this was its last filename.
    pub fn remove_message(&self, filename: impl AsRef<Path>) -> Result<()> {
        let filename = absolutize(filename.as_ref())?;
        let conn = self.require_writable()?;
        let key = filename.to_string_lossy().into_owned();
        let message_id: String = conn
            .query_row(
                "SELECT message_id FROM message_files WHERE filename = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| self.native_err(e))?;
        conn.execute("DELETE FROM message_files WHERE filename = ?1", [key.as_str()])
            .map_err(|e| self.native_err(e))?;
        let remaining: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM message_files WHERE message_id = ?1",
                [message_id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| self.native_err(e))?;
        if remaining == 0 {
            conn.execute(
                "DELETE FROM messages WHERE message_id = ?1",
                [message_id.as_str()],
            )
            .map_err(|e| self.native_err(e))?;
        }
        Ok(())
    }

    /// Exact-match lookup by message id.
    pub fn find_message(&self, id: &str) -> Result<Message<'_>> {
        let conn = self.conn()?;
        let found: String = conn
            .query_row(
                "SELECT message_id FROM messages WHERE message_id = ?1",
                [id],
                |row| row.get(0),
            )
            .map_err(|e| self.native_err(e))?;
        Ok(Message::new(self, found))
    }

    /// Exact-match lookup by filename.
    pub fn find_message_by_filename(&self, filename: impl AsRef<Path>) -> Result<Message<'_>> {
        let filename = absolutize(filename.as_ref())?;
        let conn = self.conn()?;
        let id: String = conn
            .query_row(
                "SELECT message_id FROM message_files WHERE filename = ?1",
                [filename.to_string_lossy().into_owned().as_str()],
                |row| row.get(0),
            )
            .map_err(|e| self.native_err(e))?;
        Ok(Message::new(self, id))
    }

    /// All tags known to the database.
    pub fn tags(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT tag FROM message_tags ORDER BY tag")
            .map_err(|e| self.native_err(e))?;
        let tags = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| self.native_err(e))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| self.native_err(e))?;
        Ok(tags)
    }

    /// Value for `key`, or the empty string when the key was never set.
    /// Absence is not an error.
    pub fn get_config(&self, key: &str) -> Result<String> {
        let conn = self.conn()?;
        match conn.query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
            row.get(0)
        }) {
            Ok(value) => Ok(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(String::new()),
            Err(err) => Err(self.native_err(err)),
        }
    }

    /// Persist a config value immediately.
    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.require_writable()?;
        conn.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
            [key, value],
        )
        .map_err(|e| self.native_err(e))?;
        Ok(())
    }

    /// Cursor over all config pairs whose key starts with `prefix`.
    /// The empty prefix matches everything. Enumeration order is the
    /// engine's insertion order.
    pub fn config_list(&self, prefix: &str) -> Result<ConfigEntries> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT key, value FROM config
                 WHERE substr(key, 1, length(?1)) = ?1 ORDER BY rowid",
            )
            .map_err(|e| self.native_err(e))?;
        let entries = stmt
            .query_map([prefix], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| self.native_err(e))?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()
            .map_err(|e| self.native_err(e))?;
        Ok(ConfigEntries::new(entries))
    }

    /// A query over the indexed messages. See [`Query`] for the
    /// recognized term forms.
    pub fn create_query(&self, query: impl Into<String>) -> Query<'_> {
        Query::new(self, query.into())
    }

    pub(crate) fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(ImpostError::Closed)
    }

    pub(crate) fn require_writable(&self) -> Result<&Connection> {
        if self.mode == DatabaseMode::ReadOnly {
            return Err(ImpostError::ReadOnly);
        }
        if self.needs_upgrade() {
            return Err(ImpostError::UpgradeRequired);
        }
        self.conn()
    }

    /// Record the native diagnostic and translate the status.
    pub(crate) fn native_err(&self, err: rusqlite::Error) -> ImpostError {
        self.record_status(&err.to_string());
        ImpostError::from_native(err)
    }

    fn record_status(&self, status: &str) {
        let mut guard = match self.last_status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = status.to_string();
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}

/// Rewrite the database at `path` into a compacted form, placing a
/// pre-compaction backup of the engine file at `backup_path`.
///
/// Works on a database not open in this process; no handle is required.
pub fn compact(path: impl AsRef<Path>, backup_path: impl AsRef<Path>) -> Result<()> {
    let path = absolutize(path.as_ref())?;
    let backup_path = backup_path.as_ref();
    let file = engine_file(&path);
    if !file.is_file() {
        return Err(ImpostError::NotFound);
    }
    fs::copy(&file, backup_path)?;
    let conn = Connection::open(&file).map_err(ImpostError::from_native)?;
    conn.execute_batch("VACUUM").map_err(ImpostError::from_native)?;
    if let Err((conn, err)) = conn.close() {
        drop(conn);
        return Err(ImpostError::from_native(err));
    }
    info!(path = %path.display(), backup = %backup_path.display(), "compacted database");
    Ok(())
}

fn read_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
    .map_err(ImpostError::from_native)
}
