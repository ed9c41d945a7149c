use std::sync::Arc;

/// Capability for attaching the current access token to connections and
/// requests.
///
/// Token storage and refresh live entirely outside the session core; this
/// trait is the injection point that replaces any ambient token lookup.
pub trait CredentialProvider: Send + Sync {
    /// The current bearer token, if the user is authenticated.
    fn access_token(&self) -> Option<String>;
}

/// Shared credential capability handed to the transport and REST client.
pub type Credentials = Arc<dyn CredentialProvider>;

/// Fixed-token provider for demos and tests.
pub struct StaticToken(pub String);

impl CredentialProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
