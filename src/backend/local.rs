use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use rusqlite::config::DbConfig;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::format_description::{self, FormatItem};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{schema, strip_server_columns, Backend, Credentials, FilterOp, SelectQuery};
use crate::config::StorageOptions;
use crate::models::{SortDirection, Table};
use crate::session::Session;

/// Fixed-width UTC timestamps so stored values also order correctly as text.
static TIMESTAMP_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    format_description::parse(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z",
    )
    .expect("valid timestamp format description")
});

/// Embedded stand-in for the hosted service: one SQLite file holding users,
/// sessions and every table's rows as JSON documents.
#[derive(Clone)]
pub struct LocalBackend {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl LocalBackend {
    pub fn open(options: &StorageOptions) -> Result<Self> {
        let db_path = &options.database_path;
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        prepare_connection(&conn, options)?;
        schema::apply(&conn)?;
        tracing::debug!(path = %db_path.display(), "local backend ready");
        Ok(Self {
            db_path: Arc::new(db_path.clone()),
            options: Arc::new(options.clone()),
        })
    }

    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn open_session(&self, conn: &Connection, user_id: &str, email: &str) -> Result<Session> {
        let token = Uuid::new_v4().simple().to_string();
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, server_timestamp()?],
        )
        .context("creating session")?;
        Ok(Session {
            user_id: user_id.to_string(),
            email: email.to_string(),
            access_token: token,
        })
    }
}

impl Backend for LocalBackend {
    fn select(&self, session: &Session, query: &SelectQuery) -> Result<Vec<Value>> {
        query.validate()?;
        self.with_connection(|conn| {
            let user_id = authenticate(conn, session)?;
            let mut sql =
                String::from("SELECT data FROM rows WHERE table_name = ? AND user_id = ?");
            let mut bound = vec![
                SqlValue::Text(query.table.name().to_string()),
                SqlValue::Text(user_id),
            ];
            for filter in &query.filters {
                let path = json_path(&filter.column);
                match (&filter.value, filter.op) {
                    (Value::Null, FilterOp::Eq) => {
                        sql.push_str(" AND json_extract(data, ?) IS NULL");
                        bound.push(SqlValue::Text(path));
                    }
                    (Value::Null, FilterOp::Neq) => {
                        sql.push_str(" AND json_extract(data, ?) IS NOT NULL");
                        bound.push(SqlValue::Text(path));
                    }
                    (Value::Null, op) => {
                        bail!("cannot compare column '{}' to null with {op}", filter.column)
                    }
                    (value, op) => {
                        sql.push_str(" AND json_extract(data, ?) ");
                        sql.push_str(op.sql());
                        sql.push_str(" ?");
                        bound.push(SqlValue::Text(path));
                        bound.push(sql_value(value));
                    }
                }
            }
            match &query.order {
                Some(order) => {
                    let direction = sql_direction(order.direction);
                    sql.push_str(&format!(
                        " ORDER BY json_extract(data, ?) {direction}, rowid {direction}"
                    ));
                    bound.push(SqlValue::Text(json_path(&order.column)));
                }
                None => sql.push_str(" ORDER BY rowid ASC"),
            }

            let mut stmt = conn.prepare(&sql).context("preparing select")?;
            let rows = stmt
                .query_map(params_from_iter(bound.iter()), |row| row.get::<_, String>(0))
                .context("querying rows")?;
            let mut values = Vec::new();
            for raw in rows {
                let raw = raw?;
                values.push(serde_json::from_str(&raw).context("decoding stored row")?);
            }
            tracing::debug!(table = %query.table, rows = values.len(), "local select");
            Ok(values)
        })
    }

    fn insert(&self, session: &Session, table: Table, payload: &Value) -> Result<Value> {
        let mut fields = strip_server_columns(payload)?;
        self.with_connection(|conn| {
            let user_id = authenticate(conn, session)?;
            let id = Uuid::new_v4().to_string();
            let created_at = server_timestamp()?;
            fields.insert("id".into(), Value::String(id.clone()));
            fields.insert("user_id".into(), Value::String(user_id.clone()));
            fields.insert("created_at".into(), Value::String(created_at.clone()));
            let row = Value::Object(fields);
            conn.execute(
                "INSERT INTO rows (id, table_name, user_id, created_at, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, table.name(), user_id, created_at, row.to_string()],
            )
            .with_context(|| format!("inserting into {table}"))?;
            tracing::debug!(%table, %id, "local insert");
            Ok(row)
        })
    }

    fn update(&self, session: &Session, table: Table, id: &str, payload: &Value) -> Result<Value> {
        let changes = strip_server_columns(payload)?;
        self.with_connection(|conn| {
            let user_id = authenticate(conn, session)?;
            let existing: Option<String> = conn
                .query_row(
                    "SELECT data FROM rows WHERE id = ?1 AND table_name = ?2 AND user_id = ?3",
                    params![id, table.name(), user_id],
                    |row| row.get(0),
                )
                .optional()
                .context("loading row for update")?;
            let Some(existing) = existing else {
                bail!("{table} row {id} not found");
            };
            let mut row: Value = serde_json::from_str(&existing).context("decoding stored row")?;
            let Some(fields) = row.as_object_mut() else {
                bail!("stored {table} row {id} is not an object");
            };
            for (column, value) in changes {
                fields.insert(column, value);
            }
            conn.execute(
                "UPDATE rows SET data = ?1 WHERE id = ?2 AND user_id = ?3",
                params![row.to_string(), id, user_id],
            )
            .with_context(|| format!("updating {table} row {id}"))?;
            Ok(row)
        })
    }

    fn delete(&self, session: &Session, table: Table, id: &str) -> Result<()> {
        self.with_connection(|conn| {
            let user_id = authenticate(conn, session)?;
            let removed = conn
                .execute(
                    "DELETE FROM rows WHERE id = ?1 AND table_name = ?2 AND user_id = ?3",
                    params![id, table.name(), user_id],
                )
                .with_context(|| format!("deleting {table} row {id}"))?;
            if removed == 0 {
                bail!("{table} row {id} not found");
            }
            Ok(())
        })
    }

    fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        self.with_connection(|conn| {
            let taken: Option<String> = conn
                .query_row(
                    "SELECT id FROM users WHERE email = ?1",
                    params![credentials.email],
                    |row| row.get(0),
                )
                .optional()
                .context("checking for existing user")?;
            if taken.is_some() {
                bail!("user already registered");
            }
            let user_id = Uuid::new_v4().to_string();
            let salt = Uuid::new_v4().simple().to_string();
            conn.execute(
                "INSERT INTO users (id, email, password_salt, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user_id,
                    credentials.email,
                    salt,
                    hash_password(&salt, &credentials.password),
                    server_timestamp()?
                ],
            )
            .context("inserting user")?;
            tracing::info!(email = %credentials.email, "registered local user");
            self.open_session(conn, &user_id, &credentials.email)
        })
    }

    fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        self.with_connection(|conn| {
            let user = conn
                .query_row(
                    "SELECT id, email, password_salt, password_hash FROM users WHERE email = ?1",
                    params![credentials.email],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()
                .context("looking up user")?;
            match user {
                Some((id, email, salt, hash))
                    if hash_password(&salt, &credentials.password) == hash =>
                {
                    self.open_session(conn, &id, &email)
                }
                _ => bail!("invalid login credentials"),
            }
        })
    }

    fn sign_out(&self, session: &Session) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM sessions WHERE token = ?1",
                params![session.access_token],
            )
            .context("ending session")?;
            Ok(())
        })
    }
}

/// Resolves the session token to its user; the token must belong to the
/// user the session claims.
fn authenticate(conn: &Connection, session: &Session) -> Result<String> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token = ?1",
            params![session.access_token],
            |row| row.get(0),
        )
        .optional()
        .context("validating session")?;
    match owner {
        Some(user_id) if user_id == session.user_id => Ok(user_id),
        _ => bail!("session expired or invalid, sign in again"),
    }
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)
        .context("enabling foreign keys")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    conn.busy_timeout(std::time::Duration::from_millis(storage.busy_timeout_ms))
        .context("setting busy timeout")?;
    Ok(())
}

fn server_timestamp() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&*TIMESTAMP_FORMAT)
        .context("formatting server timestamp")
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn json_path(column: &str) -> String {
    format!("$.{column}")
}

fn sql_direction(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    }
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| number.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{local_backend, signed_up};
    use serde_json::json;

    #[test]
    fn insert_assigns_server_columns() -> Result<()> {
        let (_temp, backend) = local_backend()?;
        let session = signed_up(&backend, "a@example.com")?;
        let row = backend.insert(
            &session,
            Table::Notes,
            &json!({"id": "client-made", "user_id": "someone-else", "title": "Plan"}),
        )?;
        assert_ne!(row["id"], "client-made");
        assert_eq!(row["user_id"], session.user_id.as_str());
        let created = row["created_at"].as_str().unwrap_or_default();
        assert!(OffsetDateTime::parse(
            created,
            &time::format_description::well_known::Rfc3339
        )
        .is_ok());
        Ok(())
    }

    #[test]
    fn rows_are_invisible_to_other_users() -> Result<()> {
        let (_temp, backend) = local_backend()?;
        let alice = signed_up(&backend, "alice@example.com")?;
        let bob = signed_up(&backend, "bob@example.com")?;
        let row = backend.insert(&alice, Table::Todos, &json!({"text": "alice only"}))?;
        let id = row["id"].as_str().unwrap_or_default().to_string();

        // even an explicit predicate on alice's id yields nothing for bob
        let query = SelectQuery::table(Table::Todos).eq("user_id", alice.user_id.as_str());
        assert!(backend.select(&bob, &query)?.is_empty());
        assert!(backend
            .update(&bob, Table::Todos, &id, &json!({"text": "hijacked"}))
            .is_err());
        assert!(backend.delete(&bob, Table::Todos, &id).is_err());
        assert_eq!(backend.select(&alice, &query)?.len(), 1);
        Ok(())
    }

    #[test]
    fn select_applies_ranges_and_ordering() -> Result<()> {
        let (_temp, backend) = local_backend()?;
        let session = signed_up(&backend, "a@example.com")?;
        for (date, amount) in [("2024-01-31", 5.0), ("2024-02-01", 12.5), ("2024-02-14", 3.0)] {
            backend.insert(
                &session,
                Table::Expenses,
                &json!({"date": date, "amount": amount, "category_id": "c1"}),
            )?;
        }
        let february = SelectQuery::table(Table::Expenses)
            .gte("date", "2024-02-01")
            .lt("date", "2024-03-01")
            .order("amount", SortDirection::Descending);
        let rows = backend.select(&session, &february)?;
        let dates: Vec<_> = rows.iter().map(|r| r["date"].clone()).collect();
        assert_eq!(dates, vec![json!("2024-02-01"), json!("2024-02-14")]);
        Ok(())
    }

    #[test]
    fn boolean_and_null_predicates() -> Result<()> {
        let (_temp, backend) = local_backend()?;
        let session = signed_up(&backend, "a@example.com")?;
        backend.insert(&session, Table::Todos, &json!({"text": "a", "completed": true, "due_date": null}))?;
        backend.insert(&session, Table::Todos, &json!({"text": "b", "completed": false, "due_date": "2024-05-01"}))?;
        let done = backend.select(&session, &SelectQuery::table(Table::Todos).eq("completed", true))?;
        assert_eq!(done.len(), 1);
        assert_eq!(done[0]["text"], "a");
        let undated = backend.select(&session, &SelectQuery::table(Table::Todos).eq("due_date", Value::Null))?;
        assert_eq!(undated.len(), 1);
        assert_eq!(undated[0]["text"], "a");
        Ok(())
    }

    #[test]
    fn update_merges_and_keeps_server_columns() -> Result<()> {
        let (_temp, backend) = local_backend()?;
        let session = signed_up(&backend, "a@example.com")?;
        let row = backend.insert(&session, Table::Notes, &json!({"title": "Old", "content": "body"}))?;
        let id = row["id"].as_str().unwrap_or_default().to_string();
        let updated = backend.update(
            &session,
            Table::Notes,
            &id,
            &json!({"title": "New", "created_at": "1999-01-01T00:00:00Z"}),
        )?;
        assert_eq!(updated["title"], "New");
        assert_eq!(updated["content"], "body");
        assert_eq!(updated["created_at"], row["created_at"]);
        Ok(())
    }

    #[test]
    fn sign_in_checks_password_and_sign_out_revokes_token() -> Result<()> {
        let (_temp, backend) = local_backend()?;
        let first = signed_up(&backend, "a@example.com")?;
        assert!(backend
            .sign_in(&Credentials::new("a@example.com", "wrong-password")?)
            .is_err());
        assert!(backend
            .sign_up(&Credentials::new("A@example.com", "password1")?)
            .is_err());

        let second = backend.sign_in(&Credentials::new("a@example.com", "password1")?)?;
        assert_eq!(second.user_id, first.user_id);
        assert_ne!(second.access_token, first.access_token);

        backend.sign_out(&second)?;
        let query = SelectQuery::table(Table::Notes);
        assert!(backend.select(&second, &query).is_err());
        assert!(backend.select(&first, &query).is_ok());
        Ok(())
    }
}
