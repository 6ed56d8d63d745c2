//! Identity hook for the user joining a room.
//!
//! Roomsync doesn't sign anyone in itself. The hosting application
//! (Firebase, an OAuth flow, a config file) knows who the user is; the
//! session only needs a display name and, optionally, a photo and email to
//! put in its JOIN announcement.
//!
//! The [`IdentityProvider`] trait is that seam: one async method returning
//! a [`UserProfile`]. [`StaticIdentity`] covers tests and command-line
//! tools where the profile is known up front.

use crate::SessionError;

/// The name used when a user offers none. The broker applies the same
/// default.
pub const ANONYMOUS: &str = "Anonymous";

/// Who is joining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub display_name: String,
    pub photo_url: Option<String>,
    pub email: Option<String>,
}

impl UserProfile {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            photo_url: None,
            email: None,
        }
    }

    /// A profile with the default display name.
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS)
    }

    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Supplies the profile of the user on whose behalf a session joins.
///
/// # Example
///
/// ```rust
/// use roomsync_session::{IdentityProvider, SessionError, UserProfile};
///
/// struct EnvIdentity;
///
/// impl IdentityProvider for EnvIdentity {
///     async fn current_user(&self) -> Result<UserProfile, SessionError> {
///         let name = std::env::var("USER").map_err(|_| {
///             SessionError::IdentityUnavailable("USER is not set".into())
///         })?;
///         Ok(UserProfile::new(name))
///     }
/// }
/// ```
pub trait IdentityProvider: Send + Sync + 'static {
    /// Returns the current user's profile.
    ///
    /// # Errors
    /// [`SessionError::IdentityUnavailable`] when nobody is signed in.
    fn current_user(
        &self,
    ) -> impl std::future::Future<Output = Result<UserProfile, SessionError>> + Send;
}

/// An [`IdentityProvider`] that always returns the same profile.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub UserProfile);

impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<UserProfile, SessionError> {
        Ok(self.0.clone())
    }
}
