use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rand::Rng;

use super::SessionError;

/// Every token carries this prefix so it can be sent back verbatim in the
/// `authorization` header.
pub const TOKEN_PREFIX: &str = "Bearer ";

/// Collisions tolerated before giving up on a single `generate` call.
pub const MAX_GENERATION_ATTEMPTS: usize = 1024;

const SECURE_TOKEN_BYTES: usize = 32;
const LEGACY_KEYSPACE: u64 = 10_000_000_000_000_000;
const LEGACY_WIDTH: usize = 16;

/// An issued bearer token. The inner string is the exact header value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// Tokens are credentials; keep them out of debug output.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Produces candidate token strings. Uniqueness is enforced by [`generate`].
pub trait TokenSource: Send + Sync {
    fn candidate(&self) -> String;
}

/// `Bearer <64 hex chars>` from the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureSource;

impl TokenSource for SecureSource {
    fn candidate(&self) -> String {
        let mut bytes = [0u8; SECURE_TOKEN_BYTES];
        rand::thread_rng().fill(&mut bytes);
        format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
    }
}

/// The old wire format: `Bearer ` followed by a zero-padded 16-digit integer.
///
/// Small keyspace and not meant to be unguessable. Only use it when clients
/// depend on the exact shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacySource;

impl TokenSource for LegacySource {
    fn candidate(&self) -> String {
        let n = rand::thread_rng().gen_range(0..LEGACY_KEYSPACE);
        format!("{TOKEN_PREFIX}{n:0>LEGACY_WIDTH$}")
    }
}

/// Which [`TokenSource`] a registry draws from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenFormat {
    #[default]
    Secure,
    Legacy,
}

impl TokenFormat {
    pub fn source(self) -> Box<dyn TokenSource> {
        match self {
            Self::Secure => Box::new(SecureSource),
            Self::Legacy => Box::new(LegacySource),
        }
    }
}

impl FromStr for TokenFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secure" => Ok(Self::Secure),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown token format: {other}")),
        }
    }
}

/// Draw candidates until one is not in `existing`.
///
/// Does not insert. The caller must hold whatever lock guards `existing`
/// across this call and the insert.
pub fn generate(
    source: &dyn TokenSource,
    existing: &HashSet<String>,
) -> Result<SessionToken, SessionError> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let candidate = source.candidate();
        if !existing.contains(&candidate) {
            return Ok(SessionToken(candidate));
        }
    }
    Err(SessionError::TokenSpaceExhausted {
        attempts: MAX_GENERATION_ATTEMPTS,
    })
}
