//! Session tracking for the signed-in identity.
//!
//! The identity is explicit context: the session manager hands it out and
//! every remote operation takes it as a parameter. Transitions are published
//! on a watch channel so callers can react to sign-in and sign-out.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::db::{keys, LocalStore};
use crate::error::{Error, Result};
use crate::util::normalize_text_option;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    /// Build an identity, rejecting blank user ids.
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Result<Self> {
        let user_id = normalize_text_option(Some(user_id.into()))
            .ok_or_else(|| Error::InvalidInput("user id must not be empty".to_string()))?;
        Ok(Self {
            user_id,
            email: normalize_text_option(email),
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{email}>", self.user_id),
            None => write!(f, "{}", self.user_id),
        }
    }
}

/// Outcome of a sign-in or sign-out request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    SignedIn(Identity),
    SwitchedUser { from: Identity, to: Identity },
    SignedOut(Identity),
    Unchanged,
}

impl SessionTransition {
    /// The identity that just became active, if any.
    pub const fn signed_in(&self) -> Option<&Identity> {
        match self {
            Self::SignedIn(identity) | Self::SwitchedUser { to: identity, .. } => Some(identity),
            Self::SignedOut(_) | Self::Unchanged => None,
        }
    }
}

/// Where the active identity survives restarts.
pub trait SessionPersistence {
    fn load_session(&self) -> Result<Option<Identity>>;
    fn save_session(&self, identity: &Identity) -> Result<()>;
    fn clear_session(&self) -> Result<()>;
}

impl<T: LocalStore> SessionPersistence for T {
    fn load_session(&self) -> Result<Option<Identity>> {
        self.get_json(keys::SESSION)
    }

    fn save_session(&self, identity: &Identity) -> Result<()> {
        self.put_json(keys::SESSION, identity)
    }

    fn clear_session(&self) -> Result<()> {
        self.remove(&[keys::SESSION])
    }
}

/// Tracks the authenticated identity and notifies subscribers of changes.
pub struct SessionManager<P: SessionPersistence> {
    store: P,
    current: watch::Sender<Option<Identity>>,
}

impl<P: SessionPersistence> SessionManager<P> {
    /// Create a manager, restoring any persisted identity.
    pub fn restore(store: P) -> Result<Self> {
        let restored = store.load_session()?;
        if let Some(identity) = &restored {
            tracing::debug!("Restored session for {}", identity);
        }
        let (current, _) = watch::channel(restored);
        Ok(Self { store, current })
    }

    /// The signed-in identity, if any.
    pub fn current_user(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    /// The signed-in identity, or `AuthenticationRequired`.
    pub fn require_user(&self) -> Result<Identity> {
        self.current_user().ok_or(Error::AuthenticationRequired)
    }

    /// Observe identity changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    pub fn sign_in(&self, identity: Identity) -> Result<SessionTransition> {
        let previous = self.current_user();
        if previous.as_ref() == Some(&identity) {
            return Ok(SessionTransition::Unchanged);
        }

        self.store.save_session(&identity)?;
        self.current.send_replace(Some(identity.clone()));
        tracing::info!("Signed in as {}", identity);

        Ok(match previous {
            Some(from) => SessionTransition::SwitchedUser { from, to: identity },
            None => SessionTransition::SignedIn(identity),
        })
    }

    pub fn sign_out(&self) -> Result<SessionTransition> {
        let Some(previous) = self.current_user() else {
            return Ok(SessionTransition::Unchanged);
        };

        self.store.clear_session()?;
        self.current.send_replace(None);
        tracing::info!("Signed out {}", previous);
        Ok(SessionTransition::SignedOut(previous))
    }
}
