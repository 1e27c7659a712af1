use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, Credentials};
use crate::error::{StoreError, StoreResult};

/// Authenticated identity handed out by the backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { user_id: String, email: String },
    SignedOut,
}

type Listener = Box<dyn Fn(&AuthEvent) + Send + Sync>;

struct Inner {
    current: RwLock<Option<Session>>,
    listeners: Mutex<Vec<Listener>>,
    subscribers: Mutex<Vec<Sender<AuthEvent>>>,
    persist_path: Option<PathBuf>,
}

/// Shared handle to the signed-in user. Every store receives one; clones
/// observe the same session.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("current", &*self.inner.current.read())
            .field("persist_path", &self.inner.persist_path)
            .finish()
    }
}

impl SessionContext {
    /// Context that lives only in memory.
    pub fn ephemeral() -> Self {
        Self::build(None, None)
    }

    /// Restores the session saved at `path` by a previous run, if any.
    pub fn restore(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let saved = load_session(&path)?;
        if let Some(session) = &saved {
            tracing::debug!(email = %session.email, "restored saved session");
        }
        Ok(Self::build(saved, Some(path)))
    }

    fn build(current: Option<Session>, persist_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(current),
                listeners: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                persist_path,
            }),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.current.read().is_some()
    }

    /// The active session, or the error every guarded operation reports.
    pub fn require(&self) -> StoreResult<Session> {
        self.current().ok_or(StoreError::AuthRequired)
    }

    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Box::new(listener));
    }

    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        let (tx, rx) = unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    pub fn sign_up(&self, backend: &dyn Backend, credentials: &Credentials) -> Result<Session> {
        let session = backend
            .sign_up(credentials)
            .with_context(|| format!("signing up {}", credentials.email))?;
        self.establish(session.clone())?;
        Ok(session)
    }

    pub fn sign_in(&self, backend: &dyn Backend, credentials: &Credentials) -> Result<Session> {
        let session = backend
            .sign_in(credentials)
            .with_context(|| format!("signing in {}", credentials.email))?;
        self.establish(session.clone())?;
        Ok(session)
    }

    /// Ends the session locally even when the backend call fails; the
    /// remote error is still returned.
    pub fn sign_out(&self, backend: &dyn Backend) -> Result<()> {
        let Some(session) = self.inner.current.write().take() else {
            return Ok(());
        };
        let remote = backend.sign_out(&session);
        if let Some(path) = &self.inner.persist_path {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("removing session file {}", path.display()))?;
            }
        }
        self.emit(AuthEvent::SignedOut);
        remote.context("signing out")
    }

    fn establish(&self, session: Session) -> Result<()> {
        if let Some(path) = &self.inner.persist_path {
            save_session(path, &session)?;
        }
        let event = AuthEvent::SignedIn {
            user_id: session.user_id.clone(),
            email: session.email.clone(),
        };
        *self.inner.current.write() = Some(session);
        self.emit(event);
        Ok(())
    }

    fn emit(&self, event: AuthEvent) {
        for listener in self.inner.listeners.lock().iter() {
            listener(&event);
        }
        self.inner
            .subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn load_session(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading session file {}", path.display()))?;
    match serde_json::from_str(&raw) {
        Ok(session) => Ok(Some(session)),
        Err(err) => {
            tracing::warn!(?err, "ignoring unreadable session file {}", path.display());
            Ok(None)
        }
    }
}

fn save_session(path: &Path, session: &Session) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(session).context("serializing session")?;
    let mut file = fs::File::create(path)
        .with_context(|| format!("creating session file {}", path.display()))?;
    file.write_all(json.as_bytes())
        .context("writing session file")?;
    Ok(())
}
