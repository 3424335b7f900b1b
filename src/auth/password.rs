use log::debug;

use crate::errors::AuthError;

/// bcrypt only looks at the first 72 bytes of its input
pub const BCRYPT_MAX_INPUT: usize = 72;

/// bcrypt password hasher
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher {
    /// Create a hasher with the given work factor
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password for storage
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        bcrypt::hash(truncate(password), self.cost).map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Check a password against a stored hash
    ///
    /// A malformed stored hash counts as a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(truncate(password), hash) {
            Ok(matches) => matches,
            Err(e) => {
                debug!("Password verification failed: {}", e);
                false
            }
        }
    }
}

fn truncate(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    &bytes[..bytes.len().min(BCRYPT_MAX_INPUT)]
}
