use crate::error::AuthError;
use crate::store::{CredentialStore, Role};

/// Who is logged in and what they may see. Created by [`Session::start`],
/// discarded by [`Session::end`]; views receive it explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub login: String,
    pub role: Role,
    pub agent: String,
    pub first_access: bool,
}

impl Session {
    pub fn start(store: &CredentialStore, login: &str, password: &str) -> Result<Self, AuthError> {
        if !store.verify(login, password) {
            tracing::warn!("failed login for '{login}'");
            return Err(AuthError::InvalidCredentials);
        }
        let account = store.lookup(login).ok_or(AuthError::InvalidCredentials)?;

        tracing::info!("'{login}' logged in as {}", account.role.as_str());
        Ok(Self {
            login: login.to_string(),
            role: account.role,
            agent: account.agent,
            first_access: account.first_access,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Dashboards stay closed until the first-access password change.
    pub fn require_dashboard(&self) -> Result<(), AuthError> {
        if self.first_access {
            Err(AuthError::PasswordChangeRequired)
        } else {
            Ok(())
        }
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        self.require_dashboard()?;
        if self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::AdminOnly)
        }
    }

    pub fn change_password(
        &mut self,
        store: &CredentialStore,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() || confirmation.is_empty() {
            return Err(AuthError::EmptyPassword);
        }
        if new_password != confirmation {
            return Err(AuthError::PasswordMismatch);
        }
        if !store.change_password(&self.login, new_password)? {
            return Err(AuthError::InvalidCredentials);
        }
        self.first_access = false;
        Ok(())
    }

    pub fn end(self) {
        tracing::info!("'{}' logged out", self.login);
    }
}
