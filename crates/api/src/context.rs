use invoicer_auth::Actor;

/// Authenticated caller of a request, inserted by the auth middleware.
///
/// Present on every protected route.
#[derive(Debug, Clone)]
pub struct AuthContext {
    actor: Actor,
    token: String,
}

impl AuthContext {
    pub fn new(actor: Actor, token: String) -> Self {
        Self { actor, token }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// The bearer token the request was made with.
    pub fn token(&self) -> &str {
        &self.token
    }
}
