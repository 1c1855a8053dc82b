//! Session manager over a credential store.

use std::sync::Arc;

use tokio::sync::watch;

use super::{CredentialStore, SessionContext, UserId};
use crate::errors::AppError;

/// Credential key holding the signed-in user id.
pub const UID_KEY: &str = "uid";

/// Owns the current session and broadcasts every change to it.
pub struct SessionManager {
    credentials: Arc<dyn CredentialStore>,
    current: watch::Sender<Option<SessionContext>>,
}

impl SessionManager {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            credentials,
            current,
        }
    }

    /// Resume a stored session. Returns whether one was found.
    pub async fn load(&self) -> Result<bool, AppError> {
        let stored = self.credentials.get(UID_KEY).await?;
        match stored {
            Some(raw) => {
                let user_id = UserId::parse(raw)?;
                tracing::debug!(%user_id, "Resumed stored session");
                self.current.send_replace(Some(SessionContext::new(user_id)));
                Ok(true)
            }
            None => {
                tracing::info!("No stored session found");
                self.current.send_replace(None);
                Ok(false)
            }
        }
    }

    /// Persist a newly signed-in user and make it current.
    pub async fn set_user(&self, user_id: UserId) -> Result<SessionContext, AppError> {
        self.credentials.set(UID_KEY, user_id.as_str()).await?;
        let ctx = SessionContext::new(user_id);
        self.current.send_replace(Some(ctx.clone()));
        Ok(ctx)
    }

    /// Forget the signed-in user.
    pub async fn clear(&self) -> Result<(), AppError> {
        self.credentials.remove(UID_KEY).await?;
        self.current.send_replace(None);
        Ok(())
    }

    /// Remove every stored credential, not only the user id.
    pub async fn wipe(&self) -> Result<(), AppError> {
        self.credentials.clear().await?;
        self.current.send_replace(None);
        Ok(())
    }

    pub fn current(&self) -> Option<SessionContext> {
        self.current.borrow().clone()
    }

    /// The current session, or `NoSession` when signed out.
    pub fn require(&self) -> Result<SessionContext, AppError> {
        self.current()
            .ok_or_else(|| AppError::NoSession("No signed-in user".to_string()))
    }

    /// Watch channel that yields every session change.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionContext>> {
        self.current.subscribe()
    }
}
