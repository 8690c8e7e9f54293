use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::token::{self, SessionToken, TokenFormat, TokenSource};
use super::SessionError;

/// Set of currently valid bearer tokens, shared by every handler.
///
/// Purely in-memory: all sessions are gone after a restart. Cloning gives
/// another handle to the same set.
#[derive(Clone)]
pub struct SessionRegistry {
    tokens: Arc<Mutex<HashSet<String>>>,
    source: Arc<dyn TokenSource>,
}

impl SessionRegistry {
    pub fn new(format: TokenFormat) -> Self {
        Self {
            tokens: Arc::default(),
            source: Arc::from(format.source()),
        }
    }

    pub fn with_source(source: impl TokenSource + 'static) -> Self {
        Self {
            tokens: Arc::default(),
            source: Arc::new(source),
        }
    }

    /// Generate a token that is not live yet and register it.
    ///
    /// The uniqueness check and the insert happen under one lock, so two
    /// concurrent calls can never hand out the same token.
    pub fn issue(&self) -> Result<SessionToken, SessionError> {
        let mut tokens = self.lock();
        let token = token::generate(self.source.as_ref(), &tokens)?;
        tokens.insert(token.as_str().to_owned());
        Ok(token)
    }

    /// Remove `token`. Returns whether it was live; unknown tokens are fine.
    pub fn revoke(&self, token: &str) -> bool {
        self.lock().remove(token)
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.lock().contains(token)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Every mutation is a single insert/remove, so a poisoned set is still
    // consistent.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(TokenFormat::default())
    }
}
