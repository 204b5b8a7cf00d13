//! Identity provider port.
//!
//! The boundary to the portal's authentication subsystem: a transport
//! connection presents an opaque bearer token exactly once, at connect
//! time, and receives a resolved [`Identity`] back. The chat service never
//! sees credentials again after this call.

use hostdesk_types::error::IdentityError;
use hostdesk_types::identity::Identity;

/// Resolves an opaque portal token to an authenticated identity.
///
/// Implementations live in hostdesk-infra (e.g., `SqlitePortalDirectory`).
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token. Fails with [`IdentityError::InvalidToken`]
    /// for unknown or revoked tokens.
    fn resolve(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, IdentityError>> + Send;
}
