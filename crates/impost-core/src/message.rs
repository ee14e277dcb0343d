//! Message handles and mail file indexing

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use sha2::{Digest, Sha256};

use crate::database::Database;
use crate::error::{ImpostError, Result};

/// A message known to a database.
///
/// Borrows the owning [`Database`], so a handle cannot outlive the
/// database or be used across a close.
pub struct Message<'db> {
    db: &'db Database,
    id: String,
}

impl<'db> Message<'db> {
    pub(crate) fn new(db: &'db Database, id: String) -> Self {
        Self { db, id }
    }

    /// Stable content-derived message id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All filenames currently associated with this message.
    pub fn filenames(&self) -> Result<Vec<PathBuf>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare("SELECT filename FROM message_files WHERE message_id = ?1 ORDER BY filename")
            .map_err(|e| self.db.native_err(e))?;
        let files = stmt
            .query_map([self.id.as_str()], |row| row.get::<_, String>(0))
            .map_err(|e| self.db.native_err(e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| self.db.native_err(e))?;
        Ok(files.into_iter().map(PathBuf::from).collect())
    }

    /// Subject header as indexed.
    pub fn subject(&self) -> Result<String> {
        self.column("subject")
    }

    /// Sender as indexed ("Name <address>" when a display name was
    /// present).
    pub fn from_address(&self) -> Result<String> {
        self.column("from_address")
    }

    /// Message date, when one was present and parseable.
    pub fn date(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.db.conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT date FROM messages WHERE message_id = ?1",
                [self.id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| self.db.native_err(e))?;
        Ok(stored.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        }))
    }

    /// Tags currently on this message.
    pub fn tags(&self) -> Result<Vec<String>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare("SELECT tag FROM message_tags WHERE message_id = ?1 ORDER BY tag")
            .map_err(|e| self.db.native_err(e))?;
        let tags = stmt
            .query_map([self.id.as_str()], |row| row.get(0))
            .map_err(|e| self.db.native_err(e))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| self.db.native_err(e))?;
        Ok(tags)
    }

    /// Add a tag. Adding a tag the message already carries is a no-op.
    pub fn add_tag(&self, tag: &str) -> Result<()> {
        let conn = self.db.require_writable()?;
        conn.execute(
            "INSERT OR IGNORE INTO message_tags (message_id, tag) VALUES (?1, ?2)",
            [self.id.as_str(), tag],
        )
        .map_err(|e| self.db.native_err(e))?;
        Ok(())
    }

    /// Remove a tag. Removing an absent tag is a no-op.
    pub fn remove_tag(&self, tag: &str) -> Result<()> {
        let conn = self.db.require_writable()?;
        conn.execute(
            "DELETE FROM message_tags WHERE message_id = ?1 AND tag = ?2",
            [self.id.as_str(), tag],
        )
        .map_err(|e| self.db.native_err(e))?;
        Ok(())
    }

    fn column(&self, name: &str) -> Result<String> {
        let conn = self.db.conn()?;
        let sql = format!("SELECT {name} FROM messages WHERE message_id = ?1");
        conn.query_row(&sql, [self.id.as_str()], |row| row.get(0))
            .map_err(|e| self.db.native_err(e))
    }
}

/// Fields extracted from a mail file for indexing.
pub(crate) struct IndexedMessage {
    pub message_id: String,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub date: Option<String>,
    pub body_text: String,
}

impl IndexedMessage {
    /// Parse the mail file at `path`.
    ///
    /// The message id comes from the Message-ID header; a message
    /// without one gets a content-derived fallback id, stable across
    /// filename changes.
    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read(path)?;
        let parsed = MessageParser::default().parse(&raw).ok_or_else(|| {
            ImpostError::Database(format!("not a mail message: {}", path.display()))
        })?;
        let message_id = match parsed.message_id() {
            Some(id) => id.to_string(),
            None => format!("impost-sha256-{}", hex::encode(Sha256::digest(&raw))),
        };
        Ok(Self {
            message_id,
            subject: parsed.subject().unwrap_or_default().to_string(),
            from: parsed
                .from()
                .and_then(|a| addr_list(a).into_iter().next())
                .unwrap_or_default(),
            to: parsed.to().map(addr_list).unwrap_or_default(),
            date: parsed.date().map(|d| d.to_rfc3339()),
            body_text: parsed
                .body_text(0)
                .map(|body| body.into_owned())
                .unwrap_or_default(),
        })
    }
}

fn addr_list(address: &mail_parser::Address) -> Vec<String> {
    match address {
        mail_parser::Address::List(list) => list.iter().map(format_addr).collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|group| group.addresses.iter())
            .map(format_addr)
            .collect(),
    }
}

fn format_addr(addr: &mail_parser::Addr) -> String {
    match (addr.name.as_deref(), addr.address.as_deref()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseMode;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, raw: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, raw).unwrap();
        path
    }

    #[test]
    fn test_indexed_message_headers() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "mail",
            "Message-ID: <abc@example.org>\r\n\
             From: Alice <alice@example.org>\r\n\
             To: Bob <bob@example.com>, carol@example.com\r\n\
             Subject: Hello\r\n\
             Date: Tue, 17 Nov 2009 13:24:13 +0600\r\n\
             \r\n\
             Body here.\r\n",
        );
        let indexed = IndexedMessage::from_file(&path).unwrap();
        assert_eq!(indexed.message_id, "abc@example.org");
        assert_eq!(indexed.subject, "Hello");
        assert_eq!(indexed.from, "Alice <alice@example.org>");
        assert_eq!(indexed.to.len(), 2);
        assert!(indexed.date.is_some());
        assert!(indexed.body_text.contains("Body here."));
    }

    #[test]
    fn test_fallback_id_is_content_derived() {
        let dir = TempDir::new().unwrap();
        let raw = "From: nobody@example.org\r\nSubject: no id\r\n\r\nSame content.\r\n";
        let first = write_file(dir.path(), "one", raw);
        let second = write_file(dir.path(), "two", raw);

        let a = IndexedMessage::from_file(&first).unwrap();
        let b = IndexedMessage::from_file(&second).unwrap();
        assert!(a.message_id.starts_with("impost-sha256-"));
        // Identical content, identical id, regardless of filename
        assert_eq!(a.message_id, b.message_id);
    }

    #[test]
    fn test_message_tag_roundtrip() {
        let dir = TempDir::new().unwrap();
        let db = Database::create(dir.path()).unwrap();
        let mail = write_file(
            dir.path(),
            "mail",
            "Message-ID: <tagged@example.org>\r\nSubject: t\r\n\r\nx\r\n",
        );
        let msg = db.add_message(&mail).unwrap();

        msg.add_tag("inbox").unwrap();
        msg.add_tag("inbox").unwrap();
        assert_eq!(msg.tags().unwrap(), vec!["inbox"]);

        msg.remove_tag("inbox").unwrap();
        assert!(msg.tags().unwrap().is_empty());
    }

    #[test]
    fn test_tag_write_requires_read_write() {
        let dir = TempDir::new().unwrap();
        {
            let db = Database::create(dir.path()).unwrap();
            let mail = write_file(
                dir.path(),
                "mail",
                "Message-ID: <ro@example.org>\r\nSubject: t\r\n\r\nx\r\n",
            );
            db.add_message(&mail).unwrap();
        }
        let db = Database::open(dir.path(), DatabaseMode::ReadOnly).unwrap();
        let msg = db.find_message("ro@example.org").unwrap();
        assert!(matches!(msg.add_tag("inbox"), Err(ImpostError::ReadOnly)));
    }

    #[test]
    fn test_message_metadata_accessors() {
        let dir = TempDir::new().unwrap();
        let db = Database::create(dir.path()).unwrap();
        let mail = write_file(
            dir.path(),
            "mail",
            "Message-ID: <meta@example.org>\r\n\
             From: Alice <alice@example.org>\r\n\
             Subject: Metadata\r\n\
             Date: Tue, 17 Nov 2009 13:24:13 +0600\r\n\
             \r\n\
             x\r\n",
        );
        let msg = db.add_message(&mail).unwrap();
        assert_eq!(msg.subject().unwrap(), "Metadata");
        assert_eq!(msg.from_address().unwrap(), "Alice <alice@example.org>");
        assert!(msg.date().unwrap().is_some());
        assert_eq!(msg.filenames().unwrap(), vec![dir.path().join("mail")]);
    }
}
