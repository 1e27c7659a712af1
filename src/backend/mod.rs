use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;

use crate::models::Table;
use crate::session::Session;

mod local;
mod query;
mod rest;
mod schema;

pub use local::LocalBackend;
pub use query::{is_identifier, Filter, FilterOp, Order, SelectQuery};
pub use rest::RestBackend;

/// Columns the service assigns; clients never send them.
pub const SERVER_COLUMNS: [&str; 3] = ["id", "user_id", "created_at"];

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub const MIN_PASSWORD_LEN: usize = 6;

    pub fn new(email: &str, password: &str) -> Result<Self> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            bail!("'{email}' is not a valid email address");
        }
        if password.chars().count() < Self::MIN_PASSWORD_LEN {
            bail!(
                "password must be at least {} characters",
                Self::MIN_PASSWORD_LEN
            );
        }
        Ok(Self {
            email: email.to_lowercase(),
            password: password.to_string(),
        })
    }
}

/// The hosted auth + table service. Every data call is scoped to the
/// session's user; implementations enforce that regardless of the filters a
/// caller passes.
pub trait Backend: Send + Sync {
    fn select(&self, session: &Session, query: &SelectQuery) -> Result<Vec<Value>>;

    /// Inserts one row and returns it as stored, including server columns.
    fn insert(&self, session: &Session, table: Table, payload: &Value) -> Result<Value>;

    fn update(&self, session: &Session, table: Table, id: &str, payload: &Value)
        -> Result<Value>;

    fn delete(&self, session: &Session, table: Table, id: &str) -> Result<()>;

    fn sign_up(&self, credentials: &Credentials) -> Result<Session>;

    fn sign_in(&self, credentials: &Credentials) -> Result<Session>;

    fn sign_out(&self, session: &Session) -> Result<()>;
}

/// Drops server-assigned columns from a client payload.
pub(crate) fn strip_server_columns(payload: &Value) -> Result<serde_json::Map<String, Value>> {
    let Value::Object(fields) = payload else {
        bail!("row payload must be a JSON object");
    };
    let mut fields = fields.clone();
    for column in SERVER_COLUMNS {
        fields.remove(column);
    }
    Ok(fields)
}
