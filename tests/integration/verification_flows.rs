use authstep::{
    remaining_attempts, AuthMethod, AuthMethodPolicy, AuthStepResult, AuthenticationResult,
    CatalogSnapshot, CredentialError, CredentialStatus, CredentialStore, OperationResult,
    OperationStore, OrchestrationError, OtpStatus, OtpStore, PlainTextSecretProtection,
    SecretProtection, UpdateOperationRequest, VerificationMode, VerifyCredentialRequest,
    VerifyOtpRequest,
};
use chrono::{Duration, Utc};

use crate::common::{payment_rules, pin_credential, sms_otp, TestHarness, TEST_USER};

/// Verification flow tests
///
/// These integration tests cover credential and OTP verification through the
/// orchestration layer: counter maintenance, blocking transitions, attempt
/// ceilings and the engine hand-off.

fn credential_request(operation_id: &str, value: &str) -> VerifyCredentialRequest {
    VerifyCredentialRequest {
        operation_id: operation_id.to_string(),
        user_id: TEST_USER.to_string(),
        organization_id: None,
        credential_name: "PIN".to_string(),
        value: value.to_string(),
        mode: VerificationMode::Match,
        auth_method: Some(AuthMethod::UsernamePassword),
        suppress_operation_update: false,
    }
}

async fn harness_with_credential(credential: authstep::Credential) -> (TestHarness, String) {
    let harness = TestHarness::with_rules(payment_rules()).await;
    harness.enable_standard_user();
    harness
        .credentials
        .save_credential(&credential)
        .await
        .unwrap();
    let operation_id = harness.create_operation("payment").await;
    (harness, operation_id)
}

#[tokio::test]
async fn test_blocking_at_hard_limit_stamps_timestamp_once() {
    let mut credential = pin_credential(TEST_USER, "1234");
    credential.soft_limit = None;
    credential.hard_limit = Some(3);
    let (harness, operation_id) = harness_with_credential(credential).await;

    // Two failures stay below the limit.
    for expected_remaining in [2u64, 1] {
        let response = harness
            .orchestrator
            .verify_credential(credential_request(&operation_id, "0000"))
            .await
            .unwrap();
        assert_eq!(response.authentication_result, AuthenticationResult::Failed);
        assert_eq!(response.remaining_attempts, Some(expected_remaining));
        let stored = harness
            .credentials
            .find_credential(TEST_USER, "PIN")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CredentialStatus::Active);
        assert!(stored.blocked_at.is_none());
    }

    // The third failure blocks permanently, exactly now.
    let response = harness
        .orchestrator
        .verify_credential(credential_request(&operation_id, "0000"))
        .await
        .unwrap();
    assert_eq!(response.remaining_attempts, Some(0));
    let blocked = harness
        .credentials
        .find_credential(TEST_USER, "PIN")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blocked.status, CredentialStatus::BlockedPermanent);
    let blocked_at = blocked.blocked_at.unwrap();

    // Further failures change neither the status nor the timestamp. The
    // operation already failed, so the engine hand-off is suppressed.
    let mut request = credential_request(&operation_id, "0000");
    request.suppress_operation_update = true;
    harness.orchestrator.verify_credential(request).await.unwrap();
    let still_blocked = harness
        .credentials
        .find_credential(TEST_USER, "PIN")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(still_blocked.status, CredentialStatus::BlockedPermanent);
    assert_eq!(still_blocked.blocked_at, Some(blocked_at));
    assert_eq!(still_blocked.attempt_counter, 4);
}

#[tokio::test]
async fn test_remaining_attempts_is_minimum_of_ceilings() {
    let mut otp = sms_otp("otp1", TEST_USER, "op1", "111222");
    otp.attempt_limit = Some(3);
    otp.failed_attempt_counter = 1;

    let mut credential = pin_credential(TEST_USER, "1234");
    credential.soft_limit = Some(5);
    credential.hard_limit = None;
    credential.failed_attempt_counter_soft = 4;

    assert_eq!(
        remaining_attempts(Some(&credential), Some(&otp), None),
        Some(1)
    );

    // Any inactive entity forces zero.
    otp.status = OtpStatus::Blocked;
    assert_eq!(
        remaining_attempts(Some(&credential), Some(&otp), None),
        Some(0)
    );
}

#[tokio::test]
async fn test_method_fail_limit_coerces_to_method_failure() {
    let harness = TestHarness::with_snapshot(CatalogSnapshot {
        step_definitions: payment_rules(),
        method_policies: vec![AuthMethodPolicy {
            auth_method: AuthMethod::UsernamePassword,
            check_auth_fails: true,
            max_auth_fails: Some(2),
            has_mobile_token: false,
        }],
        response_ttl_overrides: Vec::new(),
    })
    .await;
    harness.enable_standard_user();
    harness
        .credentials
        .save_credential(&pin_credential(TEST_USER, "1234"))
        .await
        .unwrap();
    let operation_id = harness.create_operation("payment").await;

    let first = harness
        .orchestrator
        .verify_credential(credential_request(&operation_id, "0000"))
        .await
        .unwrap();
    assert_eq!(first.operation.unwrap().result, OperationResult::Continue);

    // The second failure exhausts the method limit and fails the operation.
    let second = harness
        .orchestrator
        .verify_credential(credential_request(&operation_id, "0000"))
        .await
        .unwrap();
    assert_eq!(second.remaining_attempts, Some(0));
    assert_eq!(second.operation.unwrap().result, OperationResult::Failed);

    let history = harness.operations.get_history(&operation_id).await.unwrap();
    assert_eq!(
        history.last().unwrap().request_step_result,
        AuthStepResult::AuthMethodFailed
    );
}

#[tokio::test]
async fn test_expired_otp_blocks_and_counts_one_failure() {
    let harness = TestHarness::with_rules(payment_rules()).await;
    harness.enable_standard_user();
    let operation_id = harness.create_operation("payment").await;
    harness
        .orchestrator
        .update_operation(UpdateOperationRequest {
            operation_id: operation_id.clone(),
            user_id: Some(TEST_USER.to_string()),
            organization_id: None,
            auth_method: Some(AuthMethod::UsernamePassword),
            auth_step_result: Some(AuthStepResult::Confirmed),
            target_auth_method: None,
        })
        .await
        .unwrap();

    let mut otp = sms_otp("otp1", TEST_USER, &operation_id, "111222");
    otp.expires_at = Some(Utc::now() - Duration::seconds(1));
    harness.otps.save_otp(&otp).await.unwrap();

    let response = harness
        .orchestrator
        .verify_otp(VerifyOtpRequest {
            operation_id: operation_id.clone(),
            otp_id: "otp1".to_string(),
            value: "111222".to_string(),
            user_id: Some(TEST_USER.to_string()),
            auth_method: Some(AuthMethod::SmsOtp),
            suppress_operation_update: false,
        })
        .await
        .unwrap();

    // The correct value does not help an expired code.
    assert_eq!(response.authentication_result, AuthenticationResult::Failed);
    assert_eq!(response.remaining_attempts, Some(0));
    assert_eq!(response.operation.unwrap().result, OperationResult::Failed);

    let stored = harness.otps.find_otp("otp1").await.unwrap().unwrap();
    assert_eq!(stored.status, OtpStatus::Blocked);
    assert_eq!(stored.failed_attempt_counter, 1);
    assert_eq!(stored.attempt_counter, 1);
}

#[tokio::test]
async fn test_proxy_enabled_credential_delegates_comparison() {
    let mut credential = pin_credential(TEST_USER, "unused-local-value");
    credential.proxy_enabled = true;
    let (harness, operation_id) = harness_with_credential(credential).await;
    harness
        .delegate
        .set_expected("PIN", Some(TEST_USER), "remote-secret");

    let response = harness
        .orchestrator
        .verify_credential(credential_request(&operation_id, "remote-secret"))
        .await
        .unwrap();
    assert_eq!(
        response.authentication_result,
        AuthenticationResult::Succeeded
    );
}

#[tokio::test]
async fn test_positions_only_verification() {
    let protected = PlainTextSecretProtection::new().protect("13579").unwrap();
    let mut credential = pin_credential(TEST_USER, "ignored");
    credential.protected_value = protected.value;
    credential.algorithm = protected.algorithm;
    let (harness, operation_id) = harness_with_credential(credential).await;

    let mut request = credential_request(&operation_id, "1x5xx");
    request.mode = VerificationMode::PositionsOnly {
        positions: vec![0, 2],
    };
    let response = harness.orchestrator.verify_credential(request).await.unwrap();
    assert_eq!(
        response.authentication_result,
        AuthenticationResult::Succeeded
    );
}

#[tokio::test]
async fn test_positions_only_rejected_for_hashed_credential() {
    let (harness, operation_id) =
        harness_with_credential(pin_credential(TEST_USER, "13579")).await;

    let mut request = credential_request(&operation_id, "1x5xx");
    request.mode = VerificationMode::PositionsOnly {
        positions: vec![0, 2],
    };
    let err = harness
        .orchestrator
        .verify_credential(request)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Credential(CredentialError::InvalidRequest(_))
    ));
}
