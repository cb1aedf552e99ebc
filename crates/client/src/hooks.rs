//! Session-expiry hooks injected into the REST backend.

/// Called when the backend rejects the bearer token.
///
/// The host UI typically logs the user out or triggers a token refresh and
/// then calls [`crate::RestBackend::replace_token`].
pub trait AuthHooks: Send + Sync {
    fn on_unauthorized(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuthHooks;

impl AuthHooks for NoopAuthHooks {
    fn on_unauthorized(&self) {}
}
