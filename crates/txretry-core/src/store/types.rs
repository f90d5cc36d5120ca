/// User row identifier.
pub type UserId = i64;

/// A stored user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds; `None` until the row is touched by an update.
    pub updated_at: Option<i64>,
}

/// Fields supplied by the caller when inserting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl NewUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}
