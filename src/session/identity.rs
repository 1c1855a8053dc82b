//! Identity provider seam and the sign-in / sign-out flows.

use async_trait::async_trait;

use super::{SessionContext, SessionManager, UserId};
use crate::data::DataAccess;
use crate::errors::AppError;
use crate::models::UserProfile;

/// What a successful sign-in yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: UserId,
    pub photo_url: Option<String>,
}

/// External service that authenticates the user interactively.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self) -> Result<Credential, AppError>;

    async fn sign_out(&self) -> Result<(), AppError>;
}

/// Provider that always signs in as one configured user.
///
/// Useful for local development and tests where no real provider exists.
pub struct StaticIdentityProvider {
    credential: Credential,
}

impl StaticIdentityProvider {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn sign_in(&self) -> Result<Credential, AppError> {
        Ok(self.credential.clone())
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Sign in through the provider, remember the user and store their profile.
pub async fn sign_in(
    identity: &dyn IdentityProvider,
    sessions: &SessionManager,
    data: &DataAccess,
) -> Result<SessionContext, AppError> {
    let credential = identity.sign_in().await?;
    let ctx = sessions.set_user(credential.user_id).await?;

    data.save_profile(
        &ctx,
        &UserProfile {
            user_pic_url: credential.photo_url,
        },
    )
    .await?;

    tracing::info!(user_id = %ctx.user_id, "Signed in");
    Ok(ctx)
}

/// Resume a stored session without prompting. `None` when there is none.
pub async fn resume(sessions: &SessionManager) -> Result<Option<SessionContext>, AppError> {
    if sessions.load().await? {
        Ok(sessions.current())
    } else {
        Ok(None)
    }
}

/// Sign out of the provider and forget the stored user.
pub async fn sign_out(
    identity: &dyn IdentityProvider,
    sessions: &SessionManager,
) -> Result<(), AppError> {
    identity.sign_out().await?;
    sessions.clear().await?;
    tracing::info!("Signed out");
    Ok(())
}
