//! Native engine schema for the mail index

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// Engine-side schema definition
pub struct Schema;

impl Schema {
    /// Get the complete schema SQL
    pub fn create_tables() -> &'static str {
        r#"
PRAGMA foreign_keys = ON;

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Messages, keyed by the stable content-derived message id
CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT PRIMARY KEY,
    subject TEXT NOT NULL DEFAULT '',
    from_address TEXT NOT NULL DEFAULT '',
    to_addresses TEXT NOT NULL DEFAULT '[]',
    date TEXT,
    body_text TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(date);

-- Filename associations; a message may live under several filenames
CREATE TABLE IF NOT EXISTS message_files (
    filename TEXT PRIMARY KEY,
    message_id TEXT NOT NULL REFERENCES messages(message_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_message_files_message ON message_files(message_id);

-- Tags per message
CREATE TABLE IF NOT EXISTS message_tags (
    message_id TEXT NOT NULL REFERENCES messages(message_id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (message_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_message_tags_tag ON message_tags(tag);

-- Per-database configuration
CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#
    }

    /// Get migration SQL for a specific version
    pub fn migration(from_version: u32, to_version: u32) -> Option<&'static str> {
        match (from_version, to_version) {
            // Add migrations here as the schema evolves
            // (1, 2) => Some("ALTER TABLE ..."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_sql_valid() {
        let sql = Schema::create_tables();
        assert!(sql.contains("CREATE TABLE"));
        assert!(sql.contains("message_tags"));
    }

    #[test]
    fn test_no_migrations_from_current() {
        assert!(Schema::migration(SCHEMA_VERSION, SCHEMA_VERSION + 1).is_none());
    }
}
