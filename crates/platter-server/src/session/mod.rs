//! Bearer-token sessions.
//!
//! A session is nothing more than a token string present in the
//! [`SessionRegistry`]. Tokens carry no identity and never expire; they live
//! until logout or process restart.

pub mod registry;
pub mod token;

pub use registry::SessionRegistry;
pub use token::{SessionToken, TokenFormat, TokenSource};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no unused token found after {attempts} attempts")]
    TokenSpaceExhausted { attempts: usize },
}
