use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tempfile::TempDir;

use crate::backend::{Backend, Credentials, LocalBackend, SelectQuery};
use crate::config::StorageOptions;
use crate::models::{Resource, Table};
use crate::notify::Notifier;
use crate::session::{Session, SessionContext};
use crate::store::ResourceStore;

pub const TEST_PASSWORD: &str = "password1";

pub fn local_backend() -> Result<(TempDir, LocalBackend)> {
    let temp = TempDir::new()?;
    let options = StorageOptions {
        database_path: temp.path().join("data/lifeboard.db"),
        ..StorageOptions::default()
    };
    let backend = LocalBackend::open(&options)?;
    Ok((temp, backend))
}

pub fn signed_up(backend: &dyn Backend, email: &str) -> Result<Session> {
    backend.sign_up(&Credentials::new(email, TEST_PASSWORD)?)
}

/// Wraps the local backend, counting data calls and failing on request.
pub struct FlakyBackend {
    inner: LocalBackend,
    calls: AtomicUsize,
    failures: AtomicUsize,
}

impl FlakyBackend {
    pub fn new(inner: LocalBackend) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_calls(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    fn enter(&self, action: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("simulated network failure during {action}"));
        }
        Ok(())
    }
}

impl Backend for FlakyBackend {
    fn select(&self, session: &Session, query: &SelectQuery) -> Result<Vec<Value>> {
        self.enter("select")?;
        self.inner.select(session, query)
    }

    fn insert(&self, session: &Session, table: Table, payload: &Value) -> Result<Value> {
        self.enter("insert")?;
        self.inner.insert(session, table, payload)
    }

    fn update(&self, session: &Session, table: Table, id: &str, payload: &Value) -> Result<Value> {
        self.enter("update")?;
        self.inner.update(session, table, id, payload)
    }

    fn delete(&self, session: &Session, table: Table, id: &str) -> Result<()> {
        self.enter("delete")?;
        self.inner.delete(session, table, id)
    }

    fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        self.inner.sign_up(credentials)
    }

    fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        self.inner.sign_in(credentials)
    }

    fn sign_out(&self, session: &Session) -> Result<()> {
        self.inner.sign_out(session)
    }
}

/// A backend, a session context and a notifier wired together.
pub struct Harness {
    pub backend: Arc<FlakyBackend>,
    pub session: SessionContext,
    pub notifier: Notifier,
    _temp: TempDir,
}

impl Harness {
    pub fn signed_out() -> Result<Self> {
        let (temp, local) = local_backend()?;
        Ok(Self {
            backend: Arc::new(FlakyBackend::new(local)),
            session: SessionContext::ephemeral(),
            notifier: Notifier::new(),
            _temp: temp,
        })
    }

    pub fn signed_in() -> Result<Self> {
        let harness = Self::signed_out()?;
        let credentials = Credentials::new("owner@example.com", TEST_PASSWORD)?;
        harness
            .session
            .sign_up(harness.backend.as_ref(), &credentials)?;
        Ok(harness)
    }

    pub fn session(&self) -> Result<Session> {
        Ok(self.session.require()?)
    }

    pub fn store<R: Resource>(&self) -> ResourceStore<R> {
        let backend: Arc<dyn Backend> = self.backend.clone();
        ResourceStore::new(backend, self.session.clone(), self.notifier.clone())
    }
}
