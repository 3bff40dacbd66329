//! Visitor identity resolution.
//!
//! A visitor is identified by an opaque token that the client holds and
//! presents on every call (an HTTP cookie in the server). The resolver either
//! echoes a presented token verbatim or mints a new one. It never replaces a
//! token the client already holds.

use crate::{Error, Result};
use rand::{TryRngCore, rngs::OsRng};
use std::sync::Arc;
use uuid::Builder;

/// A source of 128 random bits used to mint identities.
///
/// Plug in a fixed or failing source in tests.
///
/// # Example
/// ```
/// use tally_core::{RandSource, Result};
///
/// struct FixedRand;
/// impl RandSource for FixedRand {
///     fn rand(&self) -> Result<u128> {
///         Ok(1234)
///     }
/// }
///
/// assert_eq!(FixedRand.rand(), Ok(1234));
/// ```
pub trait RandSource: Send + Sync {
    fn rand(&self) -> Result<u128>;
}

impl<T: RandSource + ?Sized> RandSource for Arc<T> {
    fn rand(&self) -> Result<u128> {
        (**self).rand()
    }
}

/// Draws from the operating system's cryptographically secure RNG.
#[derive(Default, Clone, Copy, Debug)]
pub struct OsRandom;

impl RandSource for OsRandom {
    fn rand(&self) -> Result<u128> {
        let mut bytes = [0_u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::IdentityGeneration {
                reason: e.to_string(),
            })?;
        Ok(u128::from_le_bytes(bytes))
    }
}

/// Outcome of [`IdentityResolver::resolve`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Identity to key this visitor's counters by.
    pub identity: String,
    /// Token the client must persist, present only when the identity was
    /// freshly minted.
    pub issued: Option<String>,
}

/// Derives a stable visitor identity from an optional client-held token.
#[derive(Clone, Debug, Default)]
pub struct IdentityResolver<R = OsRandom> {
    rand: R,
}

impl IdentityResolver<OsRandom> {
    pub const fn new() -> Self {
        Self { rand: OsRandom }
    }
}

impl<R: RandSource> IdentityResolver<R> {
    pub const fn with_rand(rand: R) -> Self {
        Self { rand }
    }

    /// Resolves the identity for a caller presenting `inbound`.
    ///
    /// A present, non-empty token is returned as the identity and nothing is
    /// issued. Otherwise a new version-4 UUID (122 random bits) is minted and
    /// returned both as the identity and as the token to issue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityGeneration`] if the random source fails.
    pub fn resolve(&self, inbound: Option<&str>) -> Result<Resolved> {
        if let Some(token) = inbound.filter(|token| !token.is_empty()) {
            return Ok(Resolved {
                identity: token.to_string(),
                issued: None,
            });
        }

        let bytes = self.rand.rand()?.to_le_bytes();
        let identity = Builder::from_random_bytes(bytes)
            .into_uuid()
            .hyphenated()
            .to_string();

        tracing::debug!(%identity, "Issued new visitor identity");
        Ok(Resolved {
            identity: identity.clone(),
            issued: Some(identity),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};
    use std::collections::HashSet;

    struct SeqRand {
        next: AtomicU64,
    }

    impl RandSource for SeqRand {
        fn rand(&self) -> Result<u128> {
            Ok(self.next.fetch_add(1, Ordering::Relaxed) as u128)
        }
    }

    struct BrokenRand;

    impl RandSource for BrokenRand {
        fn rand(&self) -> Result<u128> {
            Err(Error::IdentityGeneration {
                reason: "entropy exhausted".to_string(),
            })
        }
    }

    #[test]
    fn presented_token_is_echoed_without_issuing() {
        let resolver = IdentityResolver::new();
        let resolved = resolver.resolve(Some("visitor-42")).unwrap();
        assert_eq!(resolved.identity, "visitor-42");
        assert_eq!(resolved.issued, None);

        // Stable across repeated calls.
        assert_eq!(resolver.resolve(Some("visitor-42")).unwrap(), resolved);
    }

    #[test]
    fn missing_or_empty_token_mints_and_issues() {
        let resolver = IdentityResolver::new();
        for inbound in [None, Some("")] {
            let resolved = resolver.resolve(inbound).unwrap();
            assert!(!resolved.identity.is_empty());
            assert_eq!(resolved.issued.as_deref(), Some(resolved.identity.as_str()));
        }
    }

    #[test]
    fn minted_identity_is_a_v4_uuid() {
        let resolved = IdentityResolver::new().resolve(None).unwrap();
        let parsed = uuid::Uuid::parse_str(&resolved.identity).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(resolved.identity, resolved.identity.to_lowercase());
        assert_eq!(resolved.identity.len(), 36);
    }

    #[test]
    fn minted_identities_are_unique() {
        let resolver = IdentityResolver::with_rand(SeqRand {
            next: AtomicU64::new(0),
        });
        let mut seen = HashSet::new();
        for _ in 0..1024 {
            let resolved = resolver.resolve(None).unwrap();
            assert!(seen.insert(resolved.identity), "duplicate identity");
        }

        let resolver = IdentityResolver::new();
        let mut seen = HashSet::new();
        for _ in 0..1024 {
            assert!(seen.insert(resolver.resolve(None).unwrap().identity));
        }
    }

    #[test]
    fn random_failure_is_reported() {
        let resolver = IdentityResolver::with_rand(BrokenRand);
        let err = resolver.resolve(None).unwrap_err();
        assert!(matches!(err, Error::IdentityGeneration { .. }));

        // A presented token never touches the random source.
        assert!(resolver.resolve(Some("kept")).is_ok());
    }
}
