/// Database row types. These map directly to SQLite rows and are
/// distinct from hush-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    pub time: String,
    pub unread: bool,
}

/// Mailbox-wide aggregates, independent of any page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCounts {
    pub total: i64,
    pub unread: i64,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub email: Option<&'a str>,
}
