use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{strip_server_columns, Backend, Credentials, FilterOp, SelectQuery};
use crate::config::BackendOptions;
use crate::models::{SortDirection, Table};
use crate::session::Session;

/// Client for a hosted PostgREST + GoTrue service.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base: Url,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
}

impl RestBackend {
    pub fn new(options: &BackendOptions) -> Result<Self> {
        let Some(url) = options.url.as_deref() else {
            bail!("backend.url must be set to use the remote backend");
        };
        let Some(anon_key) = options.anon_key.clone() else {
            bail!("backend.anon_key (or LIFEBOARD_ANON_KEY) must be set to use the remote backend");
        };
        let base = Url::parse(url).with_context(|| format!("invalid backend url '{url}'"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            base,
            anon_key,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        api_url(&self.base, segments)
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header("Accept", "application/json")
    }

    fn first_row(&self, response: Response, table: Table, action: &str) -> Result<Value> {
        let rows: Vec<Value> = ensure_success(response, action)?
            .json()
            .with_context(|| format!("decoding {action} response"))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("{table} row not found or not visible to this user"))
    }

    fn authenticate(&self, url: Url, credentials: &Credentials, action: &str) -> Result<Session> {
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(credentials)
            .send()
            .with_context(|| format!("{action} request"))?;
        let body: AuthResponse = ensure_success(response, action)?
            .json()
            .with_context(|| format!("decoding {action} response"))?;
        let (Some(access_token), Some(user)) = (body.access_token, body.user) else {
            bail!("{action} did not return a session; confirm the email address first");
        };
        Ok(Session {
            user_id: user.id,
            email: user.email.unwrap_or_else(|| credentials.email.clone()),
            access_token,
        })
    }
}

impl Backend for RestBackend {
    fn select(&self, session: &Session, query: &SelectQuery) -> Result<Vec<Value>> {
        query.validate()?;
        let url = select_url(&self.base, query)?;
        let response = self
            .authorized(self.client.get(url), &session.access_token)
            .send()
            .with_context(|| format!("fetching {}", query.table))?;
        let rows = ensure_success(response, "select")?
            .json::<Vec<Value>>()
            .with_context(|| format!("decoding {} rows", query.table))?;
        tracing::debug!(table = %query.table, rows = rows.len(), "remote select");
        Ok(rows)
    }

    fn insert(&self, session: &Session, table: Table, payload: &Value) -> Result<Value> {
        let fields = strip_server_columns(payload)?;
        let url = self.endpoint(&["rest", "v1", table.name()])?;
        let response = self
            .authorized(self.client.post(url), &session.access_token)
            .header("Prefer", "return=representation")
            .json(&Value::Object(fields))
            .send()
            .with_context(|| format!("inserting into {table}"))?;
        self.first_row(response, table, "insert")
    }

    fn update(&self, session: &Session, table: Table, id: &str, payload: &Value) -> Result<Value> {
        let fields = strip_server_columns(payload)?;
        let mut url = self.endpoint(&["rest", "v1", table.name()])?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        let response = self
            .authorized(self.client.patch(url), &session.access_token)
            .header("Prefer", "return=representation")
            .json(&Value::Object(fields))
            .send()
            .with_context(|| format!("updating {table} row {id}"))?;
        self.first_row(response, table, "update")
    }

    fn delete(&self, session: &Session, table: Table, id: &str) -> Result<()> {
        let mut url = self.endpoint(&["rest", "v1", table.name()])?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        let response = self
            .authorized(self.client.delete(url), &session.access_token)
            .header("Prefer", "return=representation")
            .send()
            .with_context(|| format!("deleting {table} row {id}"))?;
        self.first_row(response, table, "delete").map(|_| ())
    }

    fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        let url = self.endpoint(&["auth", "v1", "signup"])?;
        self.authenticate(url, credentials, "sign up")
    }

    fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let mut url = self.endpoint(&["auth", "v1", "token"])?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        self.authenticate(url, credentials, "sign in")
    }

    fn sign_out(&self, session: &Session) -> Result<()> {
        let url = self.endpoint(&["auth", "v1", "logout"])?;
        let response = self
            .authorized(self.client.post(url), &session.access_token)
            .json(&json!({}))
            .send()
            .context("sign out request")?;
        match response.status() {
            // an already-expired token still counts as signed out
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(()),
            _ => ensure_success(response, "sign out").map(|_| ()),
        }
    }
}

fn api_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| anyhow!("backend url '{base}' cannot be used as an API base"))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

/// Encodes a select as PostgREST query parameters (`column=op.value`).
fn select_url(base: &Url, query: &SelectQuery) -> Result<Url> {
    let mut url = api_url(base, &["rest", "v1", query.table.name()])?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("select", "*");
        for filter in &query.filters {
            let encoded = match &filter.value {
                Value::Null if filter.op == FilterOp::Neq => "not.is.null".to_string(),
                Value::Null => "is.null".to_string(),
                Value::String(text) => format!("{}.{}", filter.op, text),
                other => format!("{}.{}", filter.op, other),
            };
            pairs.append_pair(&filter.column, &encoded);
        }
        if let Some(order) = &query.order {
            let direction = match order.direction {
                SortDirection::Ascending => "asc",
                SortDirection::Descending => "desc",
            };
            pairs.append_pair("order", &format!("{}.{}", order.column, direction));
        }
    }
    Ok(url)
}

fn ensure_success(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|err| format!("failed to read error response body: {err}"));
    let message = error_message_for_response(status, &body);
    tracing::warn!(%status, action, %message, "backend request failed");
    bail!("{action} failed ({status}): {message}")
}

fn error_message_for_response(status: StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string();
    }
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error_description", "msg", "error"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Filter;

    fn base() -> Url {
        Url::parse("https://project.example.co/").expect("static url")
    }

    #[test]
    fn select_encodes_filters_and_order() -> Result<()> {
        let query = SelectQuery::table(Table::Expenses)
            .eq("user_id", "u-1")
            .gte("date", "2024-02-01")
            .lt("date", "2024-03-01")
            .order("date", SortDirection::Descending);
        let url = select_url(&base(), &query)?;
        assert_eq!(url.path(), "/rest/v1/expenses");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("select".into(), "*".into()),
                ("user_id".into(), "eq.u-1".into()),
                ("date".into(), "gte.2024-02-01".into()),
                ("date".into(), "lt.2024-03-01".into()),
                ("order".into(), "date.desc".into()),
            ]
        );
        Ok(())
    }

    #[test]
    fn null_and_boolean_predicates_use_postgrest_syntax() -> Result<()> {
        let query = SelectQuery::table(Table::Todos)
            .eq("completed", false)
            .filter(Filter::new("due_date", FilterOp::Eq, Value::Null))
            .filter(Filter::new("description", FilterOp::Neq, Value::Null));
        let url = select_url(&base(), &query)?;
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("completed".into(), "eq.false".into())));
        assert!(pairs.contains(&("due_date".into(), "is.null".into())));
        assert!(pairs.contains(&("description".into(), "not.is.null".into())));
        Ok(())
    }

    #[test]
    fn base_path_prefix_is_preserved() -> Result<()> {
        let base = Url::parse("http://localhost:54321/proxy/")?;
        let url = api_url(&base, &["auth", "v1", "signup"])?;
        assert_eq!(url.as_str(), "http://localhost:54321/proxy/auth/v1/signup");
        Ok(())
    }

    #[test]
    fn error_messages_prefer_service_fields() {
        assert_eq!(
            error_message_for_response(StatusCode::BAD_REQUEST, r#"{"message":"bad column"}"#),
            "bad column"
        );
        assert_eq!(
            error_message_for_response(
                StatusCode::BAD_REQUEST,
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#
            ),
            "Invalid login credentials"
        );
        assert_eq!(
            error_message_for_response(StatusCode::NOT_FOUND, "  "),
            "Not Found"
        );
        assert_eq!(
            error_message_for_response(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down"
        );
    }

    #[test]
    fn missing_remote_settings_are_reported() {
        let options = BackendOptions::default();
        let err = RestBackend::new(&options).err().map(|e| e.to_string());
        assert!(err.unwrap_or_default().contains("backend.url"));
    }
}
