//! Dispatch records: one row per (chat, segment) pair, used to decide
//! edit-vs-send on every push tick.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::{now_str, Database};

impl Database {
    pub fn dispatch_message_id(&self, chat_id: i64, segment: &str) -> Result<Option<i64>> {
        let conn = self.conn();
        let id: Option<Option<i64>> = conn
            .query_row(
                "SELECT message_id FROM dispatch_records WHERE chat_id = ?1 AND segment = ?2",
                params![chat_id, segment],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.flatten())
    }

    pub fn set_dispatch_message_id(
        &self,
        chat_id: i64,
        segment: &str,
        message_id: i64,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO dispatch_records (chat_id, segment, message_id, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![chat_id, segment, message_id, now_str()],
        )?;
        Ok(())
    }

    pub fn clear_dispatch_record(&self, chat_id: i64, segment: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM dispatch_records WHERE chat_id = ?1 AND segment = ?2",
            params![chat_id, segment],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_record_upsert() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.dispatch_message_id(-100, "fresh").unwrap(), None);

        db.set_dispatch_message_id(-100, "fresh", 42).unwrap();
        assert_eq!(db.dispatch_message_id(-100, "fresh").unwrap(), Some(42));

        // Upsert replaces, never duplicates
        db.set_dispatch_message_id(-100, "fresh", 43).unwrap();
        assert_eq!(db.dispatch_message_id(-100, "fresh").unwrap(), Some(43));

        // Other segments are independent rows
        assert_eq!(db.dispatch_message_id(-100, "top").unwrap(), None);

        db.clear_dispatch_record(-100, "fresh").unwrap();
        assert_eq!(db.dispatch_message_id(-100, "fresh").unwrap(), None);
    }
}
