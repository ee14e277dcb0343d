//! Thin pass-through query layer
//!
//! Query strings are whitespace-separated terms; all terms must match.
//! Recognized forms: `tag:inbox`, `id:<message-id>`, `from:alice`,
//! `subject:report`, and bare words (substring match over subject,
//! sender, and body). Everything past term recognition is delegated to
//! the engine.

use crate::database::Database;
use crate::error::Result;
use crate::message::Message;

/// A query scoped to an open database.
pub struct Query<'db> {
    db: &'db Database,
    query: String,
}

impl<'db> Query<'db> {
    pub(crate) fn new(db: &'db Database, query: String) -> Self {
        Self { db, query }
    }

    /// The query string this query was created with.
    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// Number of matching messages.
    pub fn count_messages(&self) -> Result<u64> {
        let conn = self.db.conn()?;
        let (where_clause, params) = self.compile();
        let sql = format!("SELECT COUNT(*) FROM messages m WHERE {where_clause}");
        let count: i64 = conn
            .query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| {
                row.get(0)
            })
            .map_err(|e| self.db.native_err(e))?;
        Ok(count as u64)
    }

    /// Matching messages, oldest first.
    pub fn search_messages(&self) -> Result<Vec<Message<'db>>> {
        let conn = self.db.conn()?;
        let (where_clause, params) = self.compile();
        let sql = format!(
            "SELECT m.message_id FROM messages m WHERE {where_clause}
             ORDER BY m.date, m.message_id"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| self.db.native_err(e))?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| self.db.native_err(e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| self.db.native_err(e))?;
        Ok(ids
            .into_iter()
            .map(|id| Message::new(self.db, id))
            .collect())
    }

    fn compile(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for term in self.query.split_whitespace() {
            if let Some(tag) = term.strip_prefix("tag:") {
                clauses.push(
                    "m.message_id IN (SELECT message_id FROM message_tags WHERE tag = ?)"
                        .to_string(),
                );
                params.push(tag.to_string());
            } else if let Some(id) = term.strip_prefix("id:") {
                clauses.push("m.message_id = ?".to_string());
                params.push(id.to_string());
            } else if let Some(from) = term.strip_prefix("from:") {
                clauses.push("m.from_address LIKE '%' || ? || '%'".to_string());
                params.push(from.to_string());
            } else if let Some(subject) = term.strip_prefix("subject:") {
                clauses.push("m.subject LIKE '%' || ? || '%'".to_string());
                params.push(subject.to_string());
            } else {
                clauses.push(
                    "(m.subject LIKE '%' || ? || '%'
                      OR m.from_address LIKE '%' || ? || '%'
                      OR m.body_text LIKE '%' || ? || '%')"
                        .to_string(),
                );
                params.push(term.to_string());
                params.push(term.to_string());
                params.push(term.to_string());
            }
        }
        let where_clause = if clauses.is_empty() {
            "1=1".to_string()
        } else {
            clauses.join(" AND ")
        };
        (where_clause, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseMode;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn write_mail(dir: &Path, name: &str, id: &str, subject: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let raw = format!(
            "Message-ID: <{id}>\r\n\
             From: Alice <alice@example.org>\r\n\
             Subject: {subject}\r\n\
             \r\n\
             {body}\r\n"
        );
        fs::write(&path, raw).unwrap();
        path
    }

    fn seeded() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::create(dir.path()).unwrap();

        let report = write_mail(
            dir.path(),
            "report",
            "report@example.org",
            "Quarterly report",
            "Numbers are up.",
        );
        let lunch = write_mail(
            dir.path(),
            "lunch",
            "lunch@example.org",
            "Lunch plans",
            "Sandwiches again.",
        );
        db.add_message(&report).unwrap().add_tag("work").unwrap();
        db.add_message(&lunch).unwrap();
        (dir, db)
    }

    #[test]
    fn test_empty_query_matches_all() {
        let (_dir, db) = seeded();
        assert_eq!(db.create_query("").count_messages().unwrap(), 2);
    }

    #[test]
    fn test_tag_term() {
        let (_dir, db) = seeded();
        let query = db.create_query("tag:work");
        let messages = query.search_messages().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), "report@example.org");
    }

    #[test]
    fn test_id_term() {
        let (_dir, db) = seeded();
        assert_eq!(db.create_query("id:lunch@example.org").count_messages().unwrap(), 1);
        assert_eq!(db.create_query("id:none@example.org").count_messages().unwrap(), 0);
    }

    #[test]
    fn test_free_text_matches_subject_and_body() {
        let (_dir, db) = seeded();
        assert_eq!(db.create_query("Quarterly").count_messages().unwrap(), 1);
        assert_eq!(db.create_query("Sandwiches").count_messages().unwrap(), 1);
    }

    #[test]
    fn test_terms_conjoin() {
        let (_dir, db) = seeded();
        assert_eq!(db.create_query("tag:work Sandwiches").count_messages().unwrap(), 0);
        assert_eq!(db.create_query("tag:work Quarterly").count_messages().unwrap(), 1);
    }

    #[test]
    fn test_query_on_read_only_handle() {
        let (dir, mut db) = seeded();
        db.close();
        let db = Database::open(dir.path(), DatabaseMode::ReadOnly).unwrap();
        assert_eq!(db.create_query("tag:work").count_messages().unwrap(), 1);
    }
}
