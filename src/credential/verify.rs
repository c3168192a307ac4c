use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::proxy::DelegatedAuthenticator;
use crate::secret::{PlainTextSecretProtection, SecretProtection};

use super::errors::CredentialError;
use super::types::{
    AuthenticationResult, Credential, CredentialStatus, Otp, OtpStatus, VerificationMode,
};

/// Validates submitted secrets and maintains the failure counters and
/// blocking status of credentials and OTPs.
///
/// The verifier mutates the passed entity in place; persisting the mutation
/// is the caller's concern.
pub struct CredentialVerifier {
    secrets: Arc<dyn SecretProtection>,
    delegate: Arc<dyn DelegatedAuthenticator>,
}

impl CredentialVerifier {
    pub fn new(secrets: Arc<dyn SecretProtection>, delegate: Arc<dyn DelegatedAuthenticator>) -> Self {
        Self { secrets, delegate }
    }

    /// Verify a submitted value against a credential and update its counters.
    ///
    /// Every attempt increments the attempt counter. Success resets both
    /// failure counters; failure increments them and applies the blocking
    /// transitions. A credential that is not `Active` fails without a value
    /// comparison but still counts the attempt.
    pub async fn verify_credential_value(
        &self,
        credential: &mut Credential,
        value: &str,
        mode: &VerificationMode,
        now: DateTime<Utc>,
    ) -> Result<AuthenticationResult, CredentialError> {
        if let VerificationMode::PositionsOnly { positions } = mode {
            if positions.is_empty() {
                return Err(CredentialError::InvalidRequest(
                    "empty position list".into(),
                ));
            }
        }
        if credential.status == CredentialStatus::Removed {
            return Err(CredentialError::NotFound(format!(
                "credential {} is removed",
                credential.credential_id
            )));
        }

        credential.attempt_counter += 1;
        credential.updated_at = now;

        if credential.status != CredentialStatus::Active {
            tracing::debug!(
                "Verification attempt against non-active credential {}",
                credential.credential_id
            );
            record_credential_failure(credential, now);
            return Ok(AuthenticationResult::Failed);
        }

        let matched = if credential.proxy_enabled {
            self.delegate
                .verify_value(&credential.credential_name, Some(&credential.user_id), value)
                .await?
        } else {
            match mode {
                VerificationMode::Match => {
                    self.secrets.verify(value, &credential.protected_value)?
                }
                VerificationMode::PositionsOnly { positions } => {
                    verify_positions(credential, value, positions)?
                }
            }
        };

        if matched {
            credential.failed_attempt_counter_soft = 0;
            credential.failed_attempt_counter_hard = 0;
            Ok(AuthenticationResult::Succeeded)
        } else {
            record_credential_failure(credential, now);
            Ok(AuthenticationResult::Failed)
        }
    }

    /// Verify a submitted value against an OTP and update its counters.
    ///
    /// An expired OTP fails regardless of the value, is blocked immediately
    /// and its fail counter increments exactly once for that check. A
    /// matching value marks the OTP used.
    pub async fn verify_otp_value(
        &self,
        otp: &mut Otp,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthenticationResult, CredentialError> {
        if otp.status == OtpStatus::Removed {
            return Err(CredentialError::NotFound(format!(
                "otp {} is removed",
                otp.otp_id
            )));
        }

        otp.attempt_counter += 1;
        otp.updated_at = now;

        if otp.status == OtpStatus::Active
            && otp.expires_at.is_some_and(|expires| now > expires)
        {
            tracing::debug!("OTP {} expired, blocking", otp.otp_id);
            otp.failed_attempt_counter += 1;
            otp.status = OtpStatus::Blocked;
            return Ok(AuthenticationResult::Failed);
        }

        if otp.status != OtpStatus::Active {
            tracing::debug!("Verification attempt against non-active OTP {}", otp.otp_id);
            record_otp_failure(otp);
            return Ok(AuthenticationResult::Failed);
        }

        let matched = if otp.proxy_enabled {
            self.delegate
                .verify_value(&otp.otp_name, otp.user_id.as_deref(), value)
                .await?
        } else {
            self.secrets.verify(value, &otp.protected_value)?
        };

        if matched {
            otp.status = OtpStatus::Used;
            Ok(AuthenticationResult::Succeeded)
        } else {
            record_otp_failure(otp);
            Ok(AuthenticationResult::Failed)
        }
    }
}

/// Compare the listed character positions of the submitted value against the
/// stored value. Any out-of-range index or mismatch is a verification
/// failure, never an error to the caller.
fn verify_positions(
    credential: &Credential,
    value: &str,
    positions: &[usize],
) -> Result<bool, CredentialError> {
    if credential.algorithm != PlainTextSecretProtection::TAG {
        return Err(CredentialError::InvalidRequest(format!(
            "positions-only verification requires a recoverable stored value, got algorithm {}",
            credential.algorithm
        )));
    }

    let stored: Vec<char> = credential.protected_value.chars().collect();
    let submitted: Vec<char> = value.chars().collect();
    for &position in positions {
        match (stored.get(position), submitted.get(position)) {
            (Some(s), Some(v)) if s == v => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

fn record_credential_failure(credential: &mut Credential, now: DateTime<Utc>) {
    credential.failed_attempt_counter_soft += 1;
    credential.failed_attempt_counter_hard += 1;

    let new_status = if credential
        .hard_limit
        .is_some_and(|limit| credential.failed_attempt_counter_hard >= limit)
    {
        CredentialStatus::BlockedPermanent
    } else if credential
        .soft_limit
        .is_some_and(|limit| credential.failed_attempt_counter_soft >= limit)
    {
        CredentialStatus::BlockedTemporary
    } else {
        return;
    };

    // The blocked timestamp is stamped once per transition, never re-stamped
    // on repeated failures in an already blocked status.
    if credential.status != new_status {
        tracing::warn!(
            "Credential {} blocked: {:?} -> {:?}",
            credential.credential_id,
            credential.status,
            new_status
        );
        credential.status = new_status;
        credential.blocked_at = Some(now);
    }
}

fn record_otp_failure(otp: &mut Otp) {
    otp.failed_attempt_counter += 1;
    if otp.status == OtpStatus::Active
        && otp
            .attempt_limit
            .is_some_and(|limit| otp.failed_attempt_counter >= limit)
    {
        tracing::warn!("OTP {} blocked after {} failures", otp.otp_id, otp.failed_attempt_counter);
        otp.status = OtpStatus::Blocked;
    }
}

/// Lift a temporary block from a credential and reset its soft failure
/// counter. The hard counter keeps its value.
pub fn unblock_credential(
    credential: &mut Credential,
    now: DateTime<Utc>,
) -> Result<(), CredentialError> {
    match credential.status {
        CredentialStatus::BlockedTemporary => {
            tracing::info!("Unblocking credential {}", credential.credential_id);
            credential.status = CredentialStatus::Active;
            credential.failed_attempt_counter_soft = 0;
            credential.blocked_at = None;
            credential.updated_at = now;
            Ok(())
        }
        CredentialStatus::Active => Err(CredentialError::NotBlocked(format!(
            "credential {} is not blocked",
            credential.credential_id
        ))),
        CredentialStatus::BlockedPermanent => Err(CredentialError::NotActive(format!(
            "credential {} is permanently blocked",
            credential.credential_id
        ))),
        CredentialStatus::Removed => Err(CredentialError::NotFound(format!(
            "credential {} is removed",
            credential.credential_id
        ))),
    }
}

/// Remaining attempts across all applicable ceilings.
///
/// The result is the minimum of the OTP ceiling, the credential soft and hard
/// ceilings, and the engine's per-operation-method ceiling; ceilings with no
/// configured limit are ignored (`None` means unlimited). Forced to zero when
/// the credential or OTP is not active or the method ceiling is exhausted.
pub fn remaining_attempts(
    credential: Option<&Credential>,
    otp: Option<&Otp>,
    method_ceiling: Option<u64>,
) -> Option<u64> {
    if credential.is_some_and(|c| c.status != CredentialStatus::Active)
        || otp.is_some_and(|o| o.status != OtpStatus::Active)
        || method_ceiling == Some(0)
    {
        return Some(0);
    }

    let mut ceilings: Vec<u64> = Vec::new();
    if let Some(otp) = otp {
        if let Some(limit) = otp.attempt_limit {
            ceilings.push(limit.saturating_sub(otp.failed_attempt_counter));
        }
    }
    if let Some(credential) = credential {
        if let Some(limit) = credential.soft_limit {
            ceilings.push(limit.saturating_sub(credential.failed_attempt_counter_soft));
        }
        if let Some(limit) = credential.hard_limit {
            ceilings.push(limit.saturating_sub(credential.failed_attempt_counter_hard));
        }
    }
    if let Some(ceiling) = method_ceiling {
        ceilings.push(ceiling);
    }

    ceilings.into_iter().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::MemoryDelegatedAuthenticator;
    use crate::secret::Sha256SecretProtection;
    use proptest::prelude::*;

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new(
            Arc::new(Sha256SecretProtection::new()),
            Arc::new(MemoryDelegatedAuthenticator::new()),
        )
    }

    fn plain_verifier() -> CredentialVerifier {
        CredentialVerifier::new(
            Arc::new(PlainTextSecretProtection::new()),
            Arc::new(MemoryDelegatedAuthenticator::new()),
        )
    }

    fn credential(protected_value: &str, algorithm: &str) -> Credential {
        Credential {
            credential_id: "cred1".into(),
            credential_name: "PIN".into(),
            user_id: "user1".into(),
            status: CredentialStatus::Active,
            protected_value: protected_value.into(),
            algorithm: algorithm.into(),
            attempt_counter: 0,
            failed_attempt_counter_soft: 0,
            failed_attempt_counter_hard: 0,
            soft_limit: Some(3),
            hard_limit: Some(5),
            blocked_at: None,
            proxy_enabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sha256_credential(value: &str) -> Credential {
        let protection = Sha256SecretProtection::new();
        let protected = protection.protect(value).unwrap();
        credential(&protected.value, &protected.algorithm)
    }

    fn otp(value: &str) -> Otp {
        let protection = Sha256SecretProtection::new();
        let protected = protection.protect(value).unwrap();
        Otp {
            otp_id: "otp1".into(),
            otp_name: "SMS_CODE".into(),
            user_id: Some("user1".into()),
            operation_id: Some("op1".into()),
            status: OtpStatus::Active,
            protected_value: protected.value,
            algorithm: protected.algorithm,
            attempt_counter: 0,
            failed_attempt_counter: 0,
            attempt_limit: Some(3),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(60)),
            proxy_enabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_success_resets_failure_counters() {
        let verifier = verifier();
        let mut cred = sha256_credential("1234");
        cred.failed_attempt_counter_soft = 2;
        cred.failed_attempt_counter_hard = 2;

        let result = verifier
            .verify_credential_value(&mut cred, "1234", &VerificationMode::Match, Utc::now())
            .await
            .unwrap();
        assert_eq!(result, AuthenticationResult::Succeeded);
        assert_eq!(cred.attempt_counter, 1);
        assert_eq!(cred.failed_attempt_counter_soft, 0);
        assert_eq!(cred.failed_attempt_counter_hard, 0);
        assert_eq!(cred.status, CredentialStatus::Active);
    }

    #[tokio::test]
    async fn test_soft_limit_blocks_temporarily() {
        let verifier = verifier();
        let mut cred = sha256_credential("1234");

        for _ in 0..2 {
            verifier
                .verify_credential_value(&mut cred, "0000", &VerificationMode::Match, Utc::now())
                .await
                .unwrap();
        }
        assert_eq!(cred.status, CredentialStatus::Active);

        verifier
            .verify_credential_value(&mut cred, "0000", &VerificationMode::Match, Utc::now())
            .await
            .unwrap();
        assert_eq!(cred.status, CredentialStatus::BlockedTemporary);
        assert!(cred.blocked_at.is_some());
    }

    #[tokio::test]
    async fn test_hard_limit_blocks_permanently_exactly_once() {
        let verifier = verifier();
        let mut cred = sha256_credential("1234");
        cred.soft_limit = None;
        cred.hard_limit = Some(3);

        for i in 1..=2 {
            verifier
                .verify_credential_value(&mut cred, "0000", &VerificationMode::Match, Utc::now())
                .await
                .unwrap();
            assert_eq!(cred.failed_attempt_counter_hard, i);
            assert_eq!(cred.status, CredentialStatus::Active);
        }

        // Failure #3 reaches the hard limit.
        verifier
            .verify_credential_value(&mut cred, "0000", &VerificationMode::Match, Utc::now())
            .await
            .unwrap();
        assert_eq!(cred.status, CredentialStatus::BlockedPermanent);
        let blocked_at = cred.blocked_at.expect("blocked timestamp set");

        // Further failures: no state change, no timestamp re-stamp, counters
        // keep counting.
        verifier
            .verify_credential_value(&mut cred, "0000", &VerificationMode::Match, Utc::now())
            .await
            .unwrap();
        assert_eq!(cred.status, CredentialStatus::BlockedPermanent);
        assert_eq!(cred.blocked_at, Some(blocked_at));
        assert_eq!(cred.failed_attempt_counter_hard, 4);
        assert_eq!(cred.attempt_counter, 4);
    }

    #[tokio::test]
    async fn test_blocked_credential_fails_even_with_correct_value() {
        let verifier = verifier();
        let mut cred = sha256_credential("1234");
        cred.status = CredentialStatus::BlockedTemporary;
        cred.blocked_at = Some(Utc::now());

        let result = verifier
            .verify_credential_value(&mut cred, "1234", &VerificationMode::Match, Utc::now())
            .await
            .unwrap();
        assert_eq!(result, AuthenticationResult::Failed);
    }

    #[tokio::test]
    async fn test_removed_credential_is_not_found() {
        let verifier = verifier();
        let mut cred = sha256_credential("1234");
        cred.status = CredentialStatus::Removed;

        let err = verifier
            .verify_credential_value(&mut cred, "1234", &VerificationMode::Match, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_positions_only_empty_list_is_invalid() {
        let verifier = plain_verifier();
        let mut cred = credential("123456", PlainTextSecretProtection::TAG);

        let err = verifier
            .verify_credential_value(
                &mut cred,
                "123456",
                &VerificationMode::PositionsOnly { positions: vec![] },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::InvalidRequest(_)));
        assert_eq!(cred.attempt_counter, 0);
    }

    #[tokio::test]
    async fn test_positions_only_match_and_mismatch() {
        let verifier = plain_verifier();
        let mut cred = credential("123456", PlainTextSecretProtection::TAG);

        // Only positions 0 and 3 compared; other characters may differ.
        let result = verifier
            .verify_credential_value(
                &mut cred,
                "1xx4xx",
                &VerificationMode::PositionsOnly {
                    positions: vec![0, 3],
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(result, AuthenticationResult::Succeeded);

        // Out-of-range position is a failure, not an error.
        let result = verifier
            .verify_credential_value(
                &mut cred,
                "123456",
                &VerificationMode::PositionsOnly {
                    positions: vec![99],
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(result, AuthenticationResult::Failed);
    }

    #[tokio::test]
    async fn test_expired_otp_blocks_and_counts_once() {
        let verifier = verifier();
        let mut otp = otp("9999");
        otp.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));

        let result = verifier
            .verify_otp_value(&mut otp, "9999", Utc::now())
            .await
            .unwrap();
        assert_eq!(result, AuthenticationResult::Failed);
        assert_eq!(otp.status, OtpStatus::Blocked);
        assert_eq!(otp.failed_attempt_counter, 1);
    }

    #[tokio::test]
    async fn test_otp_success_marks_used() {
        let verifier = verifier();
        let mut otp = otp("9999");

        let result = verifier
            .verify_otp_value(&mut otp, "9999", Utc::now())
            .await
            .unwrap();
        assert_eq!(result, AuthenticationResult::Succeeded);
        assert_eq!(otp.status, OtpStatus::Used);

        // A used OTP cannot succeed again.
        let result = verifier
            .verify_otp_value(&mut otp, "9999", Utc::now())
            .await
            .unwrap();
        assert_eq!(result, AuthenticationResult::Failed);
    }

    #[tokio::test]
    async fn test_otp_attempt_limit_blocks() {
        let verifier = verifier();
        let mut otp = otp("9999");

        for _ in 0..2 {
            verifier
                .verify_otp_value(&mut otp, "0000", Utc::now())
                .await
                .unwrap();
        }
        assert_eq!(otp.status, OtpStatus::Active);

        verifier
            .verify_otp_value(&mut otp, "0000", Utc::now())
            .await
            .unwrap();
        assert_eq!(otp.status, OtpStatus::Blocked);
    }

    #[tokio::test]
    async fn test_proxy_enabled_credential_delegates() {
        let delegate = Arc::new(MemoryDelegatedAuthenticator::new());
        delegate.set_expected("PIN", Some("user1"), "1234");
        let verifier = CredentialVerifier::new(Arc::new(Sha256SecretProtection::new()), delegate);

        let mut cred = credential("ignored-by-proxy", "NONE");
        cred.proxy_enabled = true;

        let result = verifier
            .verify_credential_value(&mut cred, "1234", &VerificationMode::Match, Utc::now())
            .await
            .unwrap();
        assert_eq!(result, AuthenticationResult::Succeeded);
    }

    #[test]
    fn test_unblock_lifts_temporary_block_only() {
        let mut cred = sha256_credential("1234");
        cred.status = CredentialStatus::BlockedTemporary;
        cred.failed_attempt_counter_soft = 3;
        cred.failed_attempt_counter_hard = 3;
        cred.blocked_at = Some(Utc::now());

        unblock_credential(&mut cred, Utc::now()).unwrap();
        assert_eq!(cred.status, CredentialStatus::Active);
        assert_eq!(cred.failed_attempt_counter_soft, 0);
        assert_eq!(cred.failed_attempt_counter_hard, 3);
        assert!(cred.blocked_at.is_none());

        // Active credential, nothing to lift.
        let err = unblock_credential(&mut cred, Utc::now()).unwrap_err();
        assert!(matches!(err, CredentialError::NotBlocked(_)));

        cred.status = CredentialStatus::BlockedPermanent;
        let err = unblock_credential(&mut cred, Utc::now()).unwrap_err();
        assert!(matches!(err, CredentialError::NotActive(_)));
    }

    #[test]
    fn test_remaining_attempts_minimum_of_ceilings() {
        // OTP limit 3 with 1 failure (ceiling 2), credential soft limit 5
        // with 4 failures (ceiling 1) => 1.
        let mut cred = sha256_credential("1234");
        cred.soft_limit = Some(5);
        cred.hard_limit = None;
        cred.failed_attempt_counter_soft = 4;
        let mut otp = otp("9999");
        otp.attempt_limit = Some(3);
        otp.failed_attempt_counter = 1;

        assert_eq!(remaining_attempts(Some(&cred), Some(&otp), None), Some(1));
    }

    #[test]
    fn test_remaining_attempts_inactive_forces_zero() {
        let mut cred = sha256_credential("1234");
        cred.status = CredentialStatus::BlockedTemporary;
        assert_eq!(remaining_attempts(Some(&cred), None, Some(10)), Some(0));

        let mut otp = otp("9999");
        otp.status = OtpStatus::Blocked;
        assert_eq!(remaining_attempts(None, Some(&otp), None), Some(0));

        assert_eq!(remaining_attempts(None, None, Some(0)), Some(0));
    }

    #[test]
    fn test_remaining_attempts_unlimited_when_no_ceiling() {
        let mut cred = sha256_credential("1234");
        cred.soft_limit = None;
        cred.hard_limit = None;
        assert_eq!(remaining_attempts(Some(&cred), None, None), None);
    }

    proptest! {
        #[test]
        fn prop_remaining_is_min_of_applicable_ceilings(
            otp_limit in proptest::option::of(0u64..20),
            otp_failed in 0u64..20,
            soft_limit in proptest::option::of(0u64..20),
            soft_failed in 0u64..20,
            method_ceiling in proptest::option::of(0u64..20),
        ) {
            let mut cred = sha256_credential("1234");
            cred.soft_limit = soft_limit;
            cred.hard_limit = None;
            cred.failed_attempt_counter_soft = soft_failed;
            let mut otp = otp("9999");
            otp.attempt_limit = otp_limit;
            otp.failed_attempt_counter = otp_failed;

            let expected = [
                otp_limit.map(|l| l.saturating_sub(otp_failed)),
                soft_limit.map(|l| l.saturating_sub(soft_failed)),
                method_ceiling,
            ]
            .into_iter()
            .flatten()
            .min();
            let expected = if method_ceiling == Some(0) { Some(0) } else { expected };

            prop_assert_eq!(
                remaining_attempts(Some(&cred), Some(&otp), method_ceiling),
                expected
            );
        }
    }
}
