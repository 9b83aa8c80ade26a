use super::{Db, Result};
use rusqlite::params;

impl Db {
    /// Record one question/answer exchange. Retrieval never reads this table.
    pub fn save_chat(&self, question: &str, response: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO chat_history (question, response) VALUES (?, ?)",
            params![question, response],
        )?;
        Ok(())
    }

    pub fn chat_history_len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chat_history", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_chat_appends() {
        let db = Db::open_in_memory().unwrap();
        db.initialize().unwrap();

        db.save_chat("what does add do?", "It adds.").unwrap();
        db.save_chat("and Subtractor?", "It subtracts.").unwrap();
        assert_eq!(db.chat_history_len().unwrap(), 2);

        let last: String = db
            .conn
            .query_row(
                "SELECT response FROM chat_history ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(last, "It subtracts.");
    }
}
