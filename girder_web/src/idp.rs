use crate::{IdpConfig, IdpProvider};
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Profile details shared with an identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    /// Object ID of the user at the provider.
    pub id: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Primary email address.
    pub primary_email: String,
}

/// Failure of an identity provider call.
#[derive(Debug, Error)]
pub enum IdpError {
    /// No client for the configured provider is available.
    #[error("identity provider '{0}' is not supported")]
    Unsupported(IdpProvider),

    /// The provider rejected or failed the call.
    #[error("identity provider call failed: {0}")]
    Provider(Box<dyn Error + Send + Sync>),
}

/// Management API of the service that owns user accounts.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Removes a user so that it can no longer sign in.
    async fn remove_user(&self, user_id: &str) -> Result<(), IdpError>;

    /// Creates a user and returns its ID at the provider.
    async fn add_user(&self, profile: &UserProfile) -> Result<String, IdpError>;

    /// Updates the profile of an existing user.
    async fn update_user(&self, profile: &UserProfile) -> Result<(), IdpError>;

    /// URL that ends the user's session at the provider.
    async fn get_logout_url(&self) -> Result<String, IdpError>;

    /// Sends the invitation email again, e.g. after its link expired.
    async fn resend_invite_email(&self, user_id: &str) -> Result<(), IdpError>;
}

/// An [`IdentityProvider`] that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopIdp;

#[async_trait]
impl IdentityProvider for NopIdp {
    async fn remove_user(&self, _user_id: &str) -> Result<(), IdpError> {
        Ok(())
    }

    async fn add_user(&self, _profile: &UserProfile) -> Result<String, IdpError> {
        Ok(String::new())
    }

    async fn update_user(&self, _profile: &UserProfile) -> Result<(), IdpError> {
        Ok(())
    }

    async fn get_logout_url(&self) -> Result<String, IdpError> {
        Ok(String::new())
    }

    async fn resend_invite_email(&self, _user_id: &str) -> Result<(), IdpError> {
        Ok(())
    }
}

/// Creates the client for the configured provider.
pub fn identity_provider(config: &IdpConfig) -> Result<Arc<dyn IdentityProvider>, IdpError> {
    match config.provider {
        IdpProvider::NopIdp => Ok(Arc::new(NopIdp)),
        provider => Err(IdpError::Unsupported(provider)),
    }
}
