use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::Rng;
use tracing::warn;

const SALT_BYTES: usize = 16;

fn argon2() -> Result<Argon2<'static>> {
    let params = Params::new(
        19456, // m_cost: 19 MiB
        2,     // t_cost: 2 iterations
        1,     // p_cost: 1 lane
        None,
    )
    .map_err(|e| anyhow!("argon2 params: {e}"))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash `password` with Argon2id and a fresh random salt. Returns the PHC
/// string, which embeds the salt and parameters.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| anyhow!("encode salt: {e}"))?;

    let hash = argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("argon2 hash: {e}"))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored PHC string. The digest comparison is
/// constant time. A malformed stored hash never verifies.
pub fn verify_password(password: &str, phc: &str) -> bool {
    let parsed = match PasswordHash::new(phc) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| match hash_password("platter-unknown-account") {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(error = %e, "could not build dummy password hash");
                None
            }
        })
        .as_deref()
}

/// Run a full verification against a throwaway hash so that a login for an
/// unknown account costs the same as one with a wrong password.
pub fn verify_nothing(password: &str) {
    if let Some(phc) = dummy_hash() {
        let _ = verify_password(password, phc);
    }
}
