//! Adaptive password and client-secret hashing.
//!
//! Uses Argon2id with a per-hash random salt and configurable cost. Stored
//! hashes carry their parameters in PHC string form, so [`PasswordHasher::needs_rehash`]
//! can flag hashes created under an older (weaker or just different) cost
//! whenever the password is next verified.

use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Cost parameters for Argon2id.
///
/// Values outside the recommended band are clamped at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashCost {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of iterations (time cost).
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl HashCost {
    /// Minimum recommended memory cost (19 MiB).
    pub const MIN_MEMORY_KIB: u32 = 19 * 1024;
    /// Maximum supported memory cost (256 MiB).
    pub const MAX_MEMORY_KIB: u32 = 256 * 1024;
    /// Minimum recommended iterations.
    pub const MIN_ITERATIONS: u32 = 2;
    /// Maximum supported iterations.
    pub const MAX_ITERATIONS: u32 = 16;
    /// Maximum supported parallelism.
    pub const MAX_PARALLELISM: u32 = 8;

    /// Clamps all parameters into the supported band.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            memory_kib: self
                .memory_kib
                .clamp(Self::MIN_MEMORY_KIB, Self::MAX_MEMORY_KIB),
            iterations: self.iterations.clamp(Self::MIN_ITERATIONS, Self::MAX_ITERATIONS),
            parallelism: self.parallelism.clamp(1, Self::MAX_PARALLELISM),
        }
    }
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Self::MIN_MEMORY_KIB,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Argon2id hasher for passwords and client secrets.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: HashCost,
}

impl PasswordHasher {
    /// Creates a hasher with the given (clamped) cost.
    #[must_use]
    pub fn new(cost: HashCost) -> Self {
        Self {
            cost: cost.clamped(),
        }
    }

    /// Reports the active cost parameters.
    #[must_use]
    pub fn cost(&self) -> HashCost {
        self.cost
    }

    fn argon2(&self) -> AuthResult<Argon2<'static>> {
        let params = Params::new(
            self.cost.memory_kib,
            self.cost.iterations,
            self.cost.parallelism,
            None,
        )
        .map_err(|e| AuthError::configuration(format!("invalid argon2 parameters: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hashes a password with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty password; hashing itself only
    /// fails on configuration errors.
    pub fn hash(&self, password: &str) -> AuthResult<String> {
        if password.is_empty() {
            return Err(AuthError::invalid_request("password must not be empty"));
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// Verifies a password against a stored PHC hash.
    ///
    /// Comparison is constant-time inside Argon2. A malformed or
    /// non-Argon2 hash verifies as `false` rather than erroring.
    #[must_use]
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        if password.is_empty() {
            return false;
        }
        let Ok(parsed) = PasswordHash::new(stored) else {
            tracing::debug!("Stored credential hash is malformed");
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Returns `true` if the stored hash was created with parameters other
    /// than the currently configured cost and should be rewritten on the
    /// next successful verification.
    #[must_use]
    pub fn needs_rehash(&self, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return true;
        };
        if Algorithm::try_from(parsed.algorithm) != Ok(Algorithm::Argon2id) {
            return true;
        }
        let Ok(params) = Params::try_from(&parsed) else {
            return true;
        };
        params.m_cost() != self.cost.memory_kib
            || params.t_cost() != self.cost.iterations
            || params.p_cost() != self.cost.parallelism
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(HashCost::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hasher = PasswordHasher::default();
        let hash = hasher.hash("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("s3cret", &hash));
        assert!(!hasher.verify("wrong", &hash));
    }

    #[test]
    fn test_same_password_different_hashes() {
        let hasher = PasswordHasher::default();
        let a = hasher.hash("s3cret").unwrap();
        let b = hasher.hash("s3cret").unwrap();
        assert_ne!(a, b, "salts must differ");
        assert!(hasher.verify("s3cret", &a));
        assert!(hasher.verify("s3cret", &b));
    }

    #[test]
    fn test_empty_password_rejected() {
        let hasher = PasswordHasher::default();
        let err = hasher.hash("").unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
        let hash = hasher.hash("x").unwrap();
        assert!(!hasher.verify("", &hash));
    }

    #[test]
    fn test_malformed_hash_verifies_false() {
        let hasher = PasswordHasher::default();
        assert!(!hasher.verify("s3cret", "not-a-phc-string"));
        assert!(!hasher.verify("s3cret", ""));
    }

    #[test]
    fn test_needs_rehash_on_cost_change() {
        let old = PasswordHasher::new(HashCost {
            memory_kib: HashCost::MIN_MEMORY_KIB,
            iterations: 2,
            parallelism: 1,
        });
        let hash = old.hash("s3cret").unwrap();
        assert!(!old.needs_rehash(&hash));

        let newer = PasswordHasher::new(HashCost {
            memory_kib: HashCost::MIN_MEMORY_KIB,
            iterations: 3,
            parallelism: 1,
        });
        assert!(newer.needs_rehash(&hash));
        // Old hash still verifies under the new configuration.
        assert!(newer.verify("s3cret", &hash));
    }

    #[test]
    fn test_needs_rehash_on_malformed() {
        let hasher = PasswordHasher::default();
        assert!(hasher.needs_rehash("garbage"));
    }

    #[test]
    fn test_cost_clamping() {
        let hasher = PasswordHasher::new(HashCost {
            memory_kib: 1,
            iterations: 0,
            parallelism: 0,
        });
        let cost = hasher.cost();
        assert_eq!(cost.memory_kib, HashCost::MIN_MEMORY_KIB);
        assert_eq!(cost.iterations, HashCost::MIN_ITERATIONS);
        assert_eq!(cost.parallelism, 1);
    }
}
