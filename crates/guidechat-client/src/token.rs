//! Shared bearer token.

use std::sync::{PoisonError, RwLock};

use guidechat_app::TokenProvider;
use guidechat_core::BearerToken;

/// Token shared between the REST client and the broker handshake.
///
/// Whoever handles sign-in writes it; every request and every new connection
/// reads the current value.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: RwLock<Option<BearerToken>>,
}

impl TokenStore {
    /// Store holding `token`.
    pub fn new(token: Option<BearerToken>) -> Self {
        Self { token: RwLock::new(token) }
    }

    /// Replace the token.
    pub fn set(&self, token: BearerToken) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Sign out.
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TokenProvider for TokenStore {
    fn token(&self) -> Option<BearerToken> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear() {
        let store = TokenStore::default();
        assert!(store.token().is_none());

        store.set(BearerToken::new("abc"));
        assert_eq!(store.token(), Some(BearerToken::new("abc")));

        store.clear();
        assert!(store.token().is_none());
    }
}
