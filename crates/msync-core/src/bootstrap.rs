use crate::service::SyncService;
use crate::session::TokenStore;
use tracing::warn;

/// Session validity as the rest of the client sees it. Nothing may load
/// data or start polling while the state is still `Unknown`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthState {
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// Resolve whether a usable session exists. A missing token is decided
/// locally with no server round-trip; anything the server rejects or
/// that fails in transport is fail-closed to `Unauthenticated`.
pub async fn resolve_session(service: &dyn SyncService, session: &TokenStore) -> AuthState {
    let Some(token) = session.token() else {
        return AuthState::Unauthenticated;
    };
    service.set_token(Some(token.to_string()));
    match service.check_session().await {
        Ok(true) => AuthState::Authenticated,
        Ok(false) => AuthState::Unauthenticated,
        Err(err) => {
            warn!(error = %err, "session check failed; treating as logged out");
            AuthState::Unauthenticated
        }
    }
}
