//! Credential verification
//!
//! Unknown email, wrong password, and store failures during verification
//! all surface as the same generic error so a caller cannot probe which
//! accounts exist.

use tracing::error;

use crate::error::{WebError, WebResult};
use crate::models::PublicUser;
use crate::repositories::UserRepository;
use crate::validation::normalize_email;

/// Verifies email/password pairs against stored credentials
#[derive(Clone)]
pub struct CredentialVerifier {
    users: UserRepository,
}

impl CredentialVerifier {
    /// Create a new credential verifier
    pub fn new(users: UserRepository) -> Self {
        Self { users }
    }

    fn invalid() -> WebError {
        WebError::InvalidCredentials {
            remaining_attempts: None,
        }
    }

    /// Verify a credential pair, returning the user with the password hash
    /// stripped. Updates `last_login_at` on success.
    pub async fn verify(&self, email: &str, password: &str) -> WebResult<PublicUser> {
        let email = normalize_email(email);

        let user = match self.users.find_by_email(&email).await {
            Ok(user) => user,
            Err(e) => {
                error!("Credential lookup failed: {:#}", e);
                return Err(Self::invalid());
            }
        };

        let Some(user) = user else {
            return Err(Self::invalid());
        };

        let valid = match self.users.verify_password(&user, password).await {
            Ok(valid) => valid,
            Err(e) => {
                error!("Password verification failed: {:#}", e);
                return Err(Self::invalid());
            }
        };

        if !valid {
            return Err(Self::invalid());
        }

        if let Err(e) = self.users.update_last_login(user.id).await {
            // The login itself stands; only the bookkeeping failed.
            error!("Failed to update last login for user {}: {:#}", user.id, e);
        }

        Ok(PublicUser::from(user))
    }
}
