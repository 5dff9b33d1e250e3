//! Registration, login, one-time passwords and the KYC stub.
//!
//! Passwords are never checked: any plausible email signs in, creating the
//! user on first sight.

use serde::Serialize;
use tracing::info;

use super::{AuthError, Engine, LedgerError};
use crate::model::{KycDocument, KycStatus, NewUser, User, UserId};
use crate::otp::IssuedOtp;
use crate::session::Session;
use crate::storage;

/// Result of any successful sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct SignedIn {
    pub session: Session,
    pub user: User,
}

impl Engine {
    pub fn register(&mut self, form: NewUser) -> Result<SignedIn, LedgerError> {
        let email = form.email.trim().to_string();
        if !is_plausible_email(&email) {
            return Err(AuthError::InvalidEmail(email).into());
        }
        if form.name.trim().is_empty() {
            return Err(AuthError::MissingField("name").into());
        }
        if self.emails.contains_key(&email.to_ascii_lowercase()) {
            return Err(AuthError::EmailInUse(email).into());
        }

        let user = User {
            id: Self::new_id(),
            name: form.name.trim().to_string(),
            email,
            phone: form.phone,
            country: form.country,
            nationality: form.nationality,
            date_of_birth: form.date_of_birth,
            kyc_status: KycStatus::Pending,
            created_at: self.now(),
        };
        info!(user = %user.id, email = %user.email, "user registered");
        self.insert_user(user.clone());
        Ok(self.sign_in(user))
    }

    pub fn login(&mut self, email: &str, _password: &str) -> Result<SignedIn, LedgerError> {
        let user = self.user_for_email(email)?;
        Ok(self.sign_in(user))
    }

    pub fn logout(&mut self, token: &str) -> Result<(), LedgerError> {
        let session = self
            .sessions
            .revoke(token)
            .ok_or(AuthError::SessionInvalid)?;
        self.mirror_remove(storage::AUTH_TOKEN);
        self.mirror_remove(storage::USER_DATA);
        info!(user = %session.user_id, "signed out");
        Ok(())
    }

    /// Issue a code for `email`. Delivery is simulated; callers decide
    /// whether to show the code.
    pub fn send_otp(&mut self, email: &str) -> Result<IssuedOtp, LedgerError> {
        let email = email.trim();
        if !is_plausible_email(email) {
            return Err(AuthError::InvalidEmail(email.to_string()).into());
        }
        let now = self.now();
        let issued = self.otps.issue(email, now);
        self.mirror_otps();
        info!(email, expires_at = %issued.expires_at, "otp issued");
        Ok(issued)
    }

    pub fn verify_otp(&mut self, email: &str, code: &str) -> Result<SignedIn, LedgerError> {
        let now = self.now();
        let result = self.otps.verify(email, code, now);
        // expired codes are dropped too, so mirror either way
        self.mirror_otps();
        result?;

        let user = self.user_for_email(email)?;
        Ok(self.sign_in(user))
    }

    pub fn current_user(&self, user: &UserId) -> Result<User, LedgerError> {
        self.users
            .get(user)
            .cloned()
            .ok_or(LedgerError::Auth(AuthError::SessionInvalid))
    }

    /// Identity verification stub: any complete document verifies the user.
    pub fn submit_kyc(&mut self, user: &UserId, document: KycDocument) -> Result<User, LedgerError> {
        if document.document_type.trim().is_empty() {
            return Err(AuthError::MissingField("document_type").into());
        }
        if document.document_number.trim().is_empty() {
            return Err(AuthError::MissingField("document_number").into());
        }
        let record = self.users.get_mut(user).ok_or(AuthError::SessionInvalid)?;
        record.kyc_status = KycStatus::Verified;
        info!(user = %user, document_type = %document.document_type, "kyc verified");
        Ok(record.clone())
    }
}

impl Engine {
    /// Existing user for `email`, or a new one named after its local part.
    fn user_for_email(&mut self, email: &str) -> Result<User, AuthError> {
        let email = email.trim();
        if !is_plausible_email(email) {
            return Err(AuthError::InvalidEmail(email.to_string()));
        }
        let existing = self
            .emails
            .get(&email.to_ascii_lowercase())
            .and_then(|id| self.users.get(id));
        if let Some(user) = existing {
            return Ok(user.clone());
        }

        let name = email.split('@').next().unwrap_or(email).to_string();
        let user = User {
            id: Self::new_id(),
            name,
            email: email.to_string(),
            phone: String::new(),
            country: String::new(),
            nationality: String::new(),
            date_of_birth: None,
            kyc_status: KycStatus::Pending,
            created_at: self.now(),
        };
        info!(user = %user.id, email, "user synthesized at sign-in");
        self.insert_user(user.clone());
        Ok(user)
    }

    fn sign_in(&mut self, user: User) -> SignedIn {
        let now = self.now();
        let session = self.sessions.create(&user.id, now);
        self.mirror_set(storage::AUTH_TOKEN, &session.token);
        self.mirror_set(storage::USER_DATA, &user);
        info!(user = %user.id, "signed in");
        SignedIn { session, user }
    }
}

/// One `@`, a non-empty local part, a dotted domain, no whitespace.
pub fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
