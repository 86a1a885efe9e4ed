//! ENS identity checks
//!
//! `NameResolver` is the seam to the naming system; `IdentityResolver` applies the
//! forward and reverse verification rules on top of it.

pub mod responses;
pub mod rpc;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::error::{FailurePolicy, REVERSE_ENS_FAILURE_POLICY, ResolverError};

pub use rpc::{DEFAULT_ENS_REGISTRY, RpcNameResolver, namehash};

/// Forward and reverse name resolution.
///
/// `Ok(None)` means the name or address is cleanly not registered. Transport and
/// node failures are `ResolverError`.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Name to canonical (lowercase) address
    async fn resolve_name(&self, name: &str) -> Result<Option<String>, ResolverError>;

    /// Address to primary name
    async fn lookup_address(&self, address: &str) -> Result<Option<String>, ResolverError>;
}

/// An identity claim the naming system does not back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityRejection {
    #[error("ENS name does not resolve")]
    NotResolved { ens: String },

    #[error("ENS does not resolve to signer address")]
    Mismatch {
        ens: String,
        expected_address: String,
        resolved_address: String,
    },

    #[error("Reverse ENS lookup returned no name for address")]
    ReverseMissing { address: String },

    #[error("Reverse ENS name does not match provided ENS")]
    ReverseMismatch {
        address: String,
        expected_ens: String,
        reverse_ens: String,
    },
}

/// Forward check failure: either a rejection or a resolver fault
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Rejected(IdentityRejection),

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

pub struct IdentityResolver {
    resolver: Arc<dyn NameResolver>,
}

impl IdentityResolver {
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        Self { resolver }
    }

    pub async fn resolve_name(&self, name: &str) -> Result<Option<String>, ResolverError> {
        self.resolver.resolve_name(name).await
    }

    pub async fn lookup_address(&self, address: &str) -> Result<Option<String>, ResolverError> {
        self.resolver.lookup_address(address).await
    }

    /// The claimed name must resolve to the signer
    pub async fn verify_forward(&self, name: &str, signer: &str) -> Result<(), IdentityError> {
        let resolved = self
            .resolver
            .resolve_name(name)
            .await?
            .ok_or_else(|| {
                IdentityError::Rejected(IdentityRejection::NotResolved {
                    ens: name.to_string(),
                })
            })?;

        if !resolved.eq_ignore_ascii_case(signer) {
            return Err(IdentityError::Rejected(IdentityRejection::Mismatch {
                ens: name.to_string(),
                expected_address: signer.to_lowercase(),
                resolved_address: resolved.to_lowercase(),
            }));
        }

        debug!(ens = %name, address = %signer, "Forward ENS verified");
        Ok(())
    }

    /// The signer must have a reverse record, equal to `claimed` when one was given.
    ///
    /// Resolver faults follow `REVERSE_ENS_FAILURE_POLICY`. Returns the reverse name,
    /// or `None` only when the policy let an unchecked address through.
    pub async fn verify_reverse(
        &self,
        signer: &str,
        claimed: Option<&str>,
    ) -> Result<Option<String>, IdentityRejection> {
        let missing = || IdentityRejection::ReverseMissing {
            address: signer.to_string(),
        };

        let reverse = match self.resolver.lookup_address(signer).await {
            Ok(Some(name)) => name,
            Ok(None) => return Err(missing()),
            Err(e) => match REVERSE_ENS_FAILURE_POLICY {
                FailurePolicy::FailClosed => {
                    error!(address = %signer, "Reverse ENS lookup failed, rejecting: {}", e);
                    return Err(missing());
                }
                FailurePolicy::FailOpen => {
                    warn!(address = %signer, "Reverse ENS lookup failed, allowing: {}", e);
                    return Ok(None);
                }
            },
        };

        if let Some(claimed) = claimed
            && !reverse.eq_ignore_ascii_case(claimed)
        {
            return Err(IdentityRejection::ReverseMismatch {
                address: signer.to_string(),
                expected_ens: claimed.to_string(),
                reverse_ens: reverse,
            });
        }

        debug!(address = %signer, ens = %reverse, "Reverse ENS verified");
        Ok(Some(reverse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[derive(Default)]
    struct FixedResolver {
        forward: HashMap<String, String>,
        reverse: HashMap<String, String>,
        down: bool,
    }

    #[async_trait]
    impl NameResolver for FixedResolver {
        async fn resolve_name(&self, name: &str) -> Result<Option<String>, ResolverError> {
            if self.down {
                return Err(ResolverError::Unavailable("connection refused".to_string()));
            }
            Ok(self.forward.get(name).cloned())
        }

        async fn lookup_address(&self, address: &str) -> Result<Option<String>, ResolverError> {
            if self.down {
                return Err(ResolverError::Unavailable("connection refused".to_string()));
            }
            Ok(self.reverse.get(address).cloned())
        }
    }

    fn identity(resolver: FixedResolver) -> IdentityResolver {
        IdentityResolver::new(Arc::new(resolver))
    }

    #[tokio::test]
    async fn test_forward_match_is_case_insensitive() {
        let mut resolver = FixedResolver::default();
        resolver
            .forward
            .insert("alice.eth".to_string(), ALICE.to_uppercase().replace("0X", "0x"));
        assert!(identity(resolver).verify_forward("alice.eth", ALICE).await.is_ok());
    }

    #[tokio::test]
    async fn test_forward_mismatch_carries_both_addresses() {
        let mut resolver = FixedResolver::default();
        resolver.forward.insert("alice.eth".to_string(), BOB.to_string());

        let err = identity(resolver)
            .verify_forward("alice.eth", ALICE)
            .await
            .unwrap_err();
        match err {
            IdentityError::Rejected(IdentityRejection::Mismatch {
                expected_address,
                resolved_address,
                ..
            }) => {
                assert_eq!(expected_address, ALICE);
                assert_eq!(resolved_address, BOB);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forward_unresolved_and_unavailable() {
        let err = identity(FixedResolver::default())
            .verify_forward("nobody.eth", ALICE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IdentityError::Rejected(IdentityRejection::NotResolved { .. })
        ));

        let down = FixedResolver {
            down: true,
            ..Default::default()
        };
        let err = identity(down).verify_forward("alice.eth", ALICE).await.unwrap_err();
        assert!(matches!(err, IdentityError::Resolver(_)));
    }

    #[tokio::test]
    async fn test_reverse_rules() {
        let mut resolver = FixedResolver::default();
        resolver.reverse.insert(ALICE.to_string(), "Alice.eth".to_string());
        let identity = identity(resolver);

        assert_eq!(
            identity.verify_reverse(ALICE, Some("alice.eth")).await.unwrap(),
            Some("Alice.eth".to_string())
        );
        assert!(identity.verify_reverse(ALICE, None).await.is_ok());
        assert!(matches!(
            identity.verify_reverse(ALICE, Some("mallory.eth")).await,
            Err(IdentityRejection::ReverseMismatch { .. })
        ));
        assert_eq!(
            identity.verify_reverse(BOB, None).await,
            Err(IdentityRejection::ReverseMissing {
                address: BOB.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_reverse_fails_closed_when_resolver_is_down() {
        let down = FixedResolver {
            down: true,
            ..Default::default()
        };
        assert_eq!(
            identity(down).verify_reverse(ALICE, None).await,
            Err(IdentityRejection::ReverseMissing {
                address: ALICE.to_string()
            })
        );
    }
}
