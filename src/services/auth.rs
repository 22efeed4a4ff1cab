use chrono::{Duration, Utc};
use rocket::serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::ServiceError;
use crate::models::{Identity, NewSession, NewUser};
use crate::store::AccountRepository;

/// A profile handed over by an identity provider once it has verified the
/// user.
#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
pub struct ProviderProfile {
    pub provider: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Display name from the provider's user record, used when the profile
    /// carries none.
    pub account_name: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
pub struct SignedIn {
    pub session_token: Uuid,
    pub identity: Identity,
}

pub fn sign_in(
    accounts: &dyn AccountRepository,
    profile: ProviderProfile,
    ttl: Duration,
) -> Result<SignedIn, ServiceError> {
    let email = match profile.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => email.to_string(),
        _ => {
            warn!(provider = %profile.provider, "sign-in profile has no email");
            return Err(ServiceError::InvalidInput("Profile has no email address".to_string()));
        }
    };

    let now = Utc::now().naive_utc();
    let new_user = NewUser {
        email,
        name: profile.name.or(profile.account_name),
        image: profile.image,
        email_verified: profile.email_verified.then_some(now),
    };

    let user = accounts.upsert_user(&new_user).map_err(|e| {
        error!(provider = %profile.provider, error = %e, "error saving user to database");
        ServiceError::InternalError("Failed to sign in".to_string())
    })?;

    let session = accounts
        .create_session(&NewSession { user_id: user.id, expires_at: now + ttl })
        .map_err(|e| {
            error!(user_id = %user.id, error = %e, "error creating session");
            ServiceError::InternalError("Failed to sign in".to_string())
        })?;

    info!(user_id = %user.id, provider = %profile.provider, "user signed in");
    Ok(SignedIn {
        session_token: session.id,
        identity: Identity { user_id: user.id, email: user.email },
    })
}

/// Resolves a session token to an identity. Anything short of a live session
/// resolves to `None`.
pub fn resolve(accounts: &dyn AccountRepository, token: &str) -> Option<Identity> {
    let token = Uuid::parse_str(token).ok()?;
    match accounts.find_identity(token, Utc::now().naive_utc()) {
        Ok(identity) => identity,
        Err(e) => {
            error!(error = %e, "error resolving session");
            None
        }
    }
}

pub fn sign_out(accounts: &dyn AccountRepository, token: &str) -> Result<(), ServiceError> {
    let session_uuid = Uuid::parse_str(token)
        .map_err(|_| ServiceError::InvalidInput("Invalid session token".to_string()))?;

    accounts.delete_session(session_uuid).map_err(|e| {
        error!(error = %e, "error deleting session");
        ServiceError::InternalError("Failed to sign out".to_string())
    })
}

pub fn purge_expired(accounts: &dyn AccountRepository) {
    match accounts.purge_expired_sessions(Utc::now().naive_utc()) {
        Ok(0) => {}
        Ok(removed) => info!(removed, "purged expired sessions"),
        Err(e) => error!(error = %e, "error purging expired sessions"),
    }
}
