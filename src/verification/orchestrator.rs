//! Login verification pipeline
//!
//! ```text
//! Received -> ParsedAndSigned -> NonceChecked -> (ForwardEnsChecked) -> (ReverseEnsChecked)
//!          -> Bound | Rejected(reason) | Error(fault)
//! ```
//!
//! The nonce is only redeemed once every check has passed, so a rejected attempt leaves
//! it usable until it expires.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ens::{IdentityError, IdentityResolver};
use crate::error::{ResolverError, StorageError};
use crate::referral::{NewReferralBinding, ReferralLedger, RequestMetadata};
use crate::reputation::{Outcome, ReputationEngine};
use crate::siwe::{ConsumeResult, NonceLedger, NonceStatus, SignatureVerifier, VerifiedLogin};
use crate::verification::Rejection;

/// One login attempt as submitted
#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub message: Option<String>,
    pub signature: Option<String>,
    pub referral_code: Option<String>,
    pub ens: Option<String>,
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAccepted {
    pub referral_id: Uuid,
    pub address: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

impl From<IdentityError> for VerifyError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected(rejection) => VerifyError::Rejected(rejection.into()),
            IdentityError::Resolver(e) => VerifyError::Resolver(e),
        }
    }
}

pub struct VerificationOrchestrator {
    verifier: SignatureVerifier,
    nonces: Arc<NonceLedger>,
    identity: Arc<IdentityResolver>,
    referrals: Arc<ReferralLedger>,
    reputation: Arc<ReputationEngine>,
    require_reverse_ens: bool,
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

impl VerificationOrchestrator {
    pub fn new(
        verifier: SignatureVerifier,
        nonces: Arc<NonceLedger>,
        identity: Arc<IdentityResolver>,
        referrals: Arc<ReferralLedger>,
        reputation: Arc<ReputationEngine>,
        require_reverse_ens: bool,
    ) -> Self {
        Self {
            verifier,
            nonces,
            identity,
            referrals,
            reputation,
            require_reverse_ens,
        }
    }

    pub fn require_reverse_ens(&self) -> bool {
        self.require_reverse_ens
    }

    /// Run one login attempt to a terminal state.
    ///
    /// Every accept or rejection with a known signer is reported to the reputation
    /// engine. Infrastructure faults are not the signer's doing and are not reported.
    pub async fn verify(&self, request: LoginRequest) -> Result<LoginAccepted, VerifyError> {
        let now = Utc::now();

        let (Some(message), Some(signature), Some(referral_code)) = (
            present(request.message),
            present(request.signature),
            present(request.referral_code),
        ) else {
            return Err(Rejection::MissingFields.into());
        };
        let ens = present(request.ens);

        let login = match self.verifier.verify(&message, &signature, now) {
            Ok(login) => login,
            Err(e) => {
                let rejection = Rejection::from(&e);
                // Without a recovered signer there is no one to attribute this to
                if let Some(signer) = e.signer() {
                    self.report(signer, Outcome::failure(rejection.code()), now)
                        .await;
                }
                info!(reason = rejection.code(), "Login rejected: {}", e);
                return Err(rejection.into());
            }
        };

        let result = self
            .check_and_bind(
                &login,
                ens.as_deref(),
                referral_code,
                signature,
                message,
                request.metadata,
                now,
            )
            .await;

        match &result {
            Ok(accepted) => {
                info!(
                    address = %accepted.address,
                    referral_id = %accepted.referral_id,
                    "Login verified"
                );
                self.report(
                    &login.address,
                    Outcome::Success {
                        verified_ens: ens.is_some(),
                    },
                    now,
                )
                .await;
            }
            Err(VerifyError::Rejected(rejection)) => {
                info!(address = %login.address, reason = rejection.code(), "Login rejected");
                self.report(&login.address, Outcome::failure(rejection.code()), now)
                    .await;
            }
            Err(_) => {}
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn check_and_bind(
        &self,
        login: &VerifiedLogin,
        ens: Option<&str>,
        referral_code: String,
        signature: String,
        raw_message: String,
        metadata: RequestMetadata,
        now: DateTime<Utc>,
    ) -> Result<LoginAccepted, VerifyError> {
        match self.nonces.check(&login.declared_nonce, now).await? {
            NonceStatus::Valid => {}
            NonceStatus::NotFound => return Err(Rejection::NonceMissing.into()),
            NonceStatus::Expired => return Err(Rejection::NonceExpired.into()),
            NonceStatus::Consumed => return Err(Rejection::NonceAlreadyUsed.into()),
        }

        if let Some(name) = ens {
            self.identity.verify_forward(name, &login.address).await?;
        }

        if self.require_reverse_ens {
            self.identity
                .verify_reverse(&login.address, ens)
                .await
                .map_err(Rejection::from)?;
        }

        match self.nonces.consume(&login.declared_nonce, now).await? {
            ConsumeResult::Ok(_) => {}
            // Another request redeemed it between the check and here
            ConsumeResult::NotFound | ConsumeResult::Expired | ConsumeResult::AlreadyUsed => {
                return Err(Rejection::NonceAlreadyUsed.into());
            }
        }

        let binding = self
            .referrals
            .bind(NewReferralBinding {
                referral_code,
                referrer_address: login.address.clone(),
                referrer_ens: ens.map(str::to_string),
                signature,
                raw_message,
                nonce: login.declared_nonce.clone(),
                metadata,
            })
            .await?;

        Ok(LoginAccepted {
            referral_id: binding.id,
            address: binding.referrer_address,
            verified_at: binding.created_at,
        })
    }

    /// Best effort; a failed write never changes the login decision
    async fn report(&self, address: &str, outcome: Outcome, at: DateTime<Utc>) {
        if let Err(e) = self.reputation.record_outcome(address, outcome, at).await {
            warn!(address = %address, "Failed to record reputation outcome: {}", e);
        }
    }
}
