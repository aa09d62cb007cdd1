use subtle::ConstantTimeEq;

/// Validates presented auth tokens against a configured shared secret.
///
/// `None` means authentication is disabled at the hub level; the hub then
/// admits connections directly with a generated pseudo-identity.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Option<String>,
}

impl TokenVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Whether authentication is required at all.
    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Constant-time comparison against the shared secret.
    ///
    /// Returns `false` when auth is disabled; callers should not reach this
    /// path in that case.
    pub fn verify(&self, presented: &str) -> bool {
        match &self.secret {
            Some(secret) => {
                // ct_eq requires equal lengths; mismatched lengths leak no
                // more than the length itself.
                secret.len() == presented.len()
                    && secret.as_bytes().ct_eq(presented.as_bytes()).into()
            }
            None => false,
        }
    }
}
