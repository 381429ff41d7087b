use crate::Database;
use crate::models::{MessageCounts, MessageRow, NewUser, UserRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// Where a page of the inbox starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    /// Newest messages first, no cursor.
    Newest,
    /// Skip this many rows of the newest-first ordering.
    Offset(i64),
    /// Only messages with an id strictly below this one.
    Before(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: PageCursor,
    /// `None` returns every matching row.
    pub limit: Option<i64>,
}

impl Database {
    // -- Users --

    /// Inserts a new user. Returns `false` when the id is already taken.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, password_hash, email) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO NOTHING",
                params![user.id, user.name, user.password_hash, user.email],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1",
                params![id, password_hash],
            )?;
            Ok(updated == 1)
        })
    }

    /// Deletes the user; messages and push endpoints go with it by cascade.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }

    // -- Push endpoints --

    /// Registered endpoint tokens in registration order.
    pub fn list_push_endpoints(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT token FROM push_endpoints WHERE user_id = ?1 ORDER BY id")?;
            let tokens = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(tokens)
        })
    }

    /// Returns `false` when the token was already registered.
    pub fn add_push_endpoint(&self, user_id: &str, token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO push_endpoints (user_id, token) VALUES (?1, ?2)",
                params![user_id, token],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn remove_push_endpoint(&self, user_id: &str, token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM push_endpoints WHERE user_id = ?1 AND token = ?2",
                params![user_id, token],
            )?;
            Ok(removed == 1)
        })
    }

    /// Swaps `previous` for `new` in place, keeping its position.
    /// Returns `false` when `previous` is not registered. If `new` is already
    /// registered, `previous` is simply dropped so the set stays duplicate-free.
    pub fn replace_push_endpoint(&self, user_id: &str, previous: &str, new: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM push_endpoints WHERE user_id = ?1 AND token = ?2",
                    params![user_id, previous],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(row_id) = existing else {
                return Ok(false);
            };

            if previous != new {
                let new_present = tx
                    .query_row(
                        "SELECT 1 FROM push_endpoints WHERE user_id = ?1 AND token = ?2",
                        params![user_id, new],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();

                if new_present {
                    tx.execute("DELETE FROM push_endpoints WHERE id = ?1", [row_id])?;
                } else {
                    tx.execute(
                        "UPDATE push_endpoints SET token = ?2 WHERE id = ?1",
                        params![row_id, new],
                    )?;
                }
            }

            tx.commit()?;
            Ok(true)
        })
    }

    /// Drops every listed token from the user's endpoint set.
    pub fn prune_push_endpoints(&self, user_id: &str, tokens: &[String]) -> Result<usize> {
        if tokens.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx
                    .prepare("DELETE FROM push_endpoints WHERE user_id = ?1 AND token = ?2")?;
                for token in tokens {
                    removed += stmt.execute(params![user_id, token])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
    }

    // -- Messages --

    /// Stores a new unread message and returns its id.
    pub fn insert_message(&self, user_id: &str, content: &str, time: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (user_id, content, time) VALUES (?1, ?2, ?3)",
                params![user_id, content, time],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Counts and one page read from the same snapshot.
    pub fn get_inbox(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> Result<(MessageCounts, Vec<MessageRow>)> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let counts = query_counts(&tx, user_id)?;
            let rows = query_page(&tx, user_id, page)?;
            tx.finish()?;
            Ok((counts, rows))
        })
    }

    pub fn get_message(&self, id: i64, owner: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, content, time, unread FROM messages
                     WHERE id = ?1 AND user_id = ?2",
                    params![id, owner],
                    message_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Returns the number of rows deleted (0 or 1).
    pub fn delete_message(&self, id: i64, owner: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND user_id = ?2",
                params![id, owner],
            )?;
            Ok(deleted)
        })
    }

    /// Returns the number of rows matched (0 or 1).
    pub fn set_unread(&self, id: i64, owner: &str, unread: bool) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET unread = ?3 WHERE id = ?1 AND user_id = ?2",
                params![id, owner, unread],
            )?;
            Ok(updated)
        })
    }
}

fn query_user(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, password_hash, email, created_at FROM users WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                password_hash: row.get(2)?,
                email: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_counts(conn: &Connection, user_id: &str) -> Result<MessageCounts> {
    let counts = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(unread), 0) FROM messages WHERE user_id = ?1",
        [user_id],
        |row| {
            Ok(MessageCounts {
                total: row.get(0)?,
                unread: row.get(1)?,
            })
        },
    )?;
    Ok(counts)
}

fn query_page(conn: &Connection, user_id: &str, page: PageRequest) -> Result<Vec<MessageRow>> {
    let (before, offset) = match page.cursor {
        PageCursor::Newest => (i64::MAX, 0),
        PageCursor::Offset(skip) => (i64::MAX, skip.max(0)),
        PageCursor::Before(id) => (id, 0),
    };
    // SQLite treats a negative LIMIT as "no limit".
    let limit = page.limit.filter(|l| *l > 0).unwrap_or(-1);

    let mut stmt = conn.prepare(
        "SELECT id, user_id, content, time, unread FROM messages
         WHERE user_id = ?1 AND id < ?2
         ORDER BY id DESC
         LIMIT ?3 OFFSET ?4",
    )?;

    let rows = stmt
        .query_map(params![user_id, before, limit, offset], message_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        time: row.get(3)?,
        unread: row.get(4)?,
    })
}
