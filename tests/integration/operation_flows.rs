use authstep::{
    AuthMethod, AuthStepResult, EngineError, OperationResult, OperationStep, OperationStore,
    OperationType, OrchestrationError, UpdateOperationRequest,
};

use crate::common::{payment_rules, rule, TestHarness, TEST_USER};

/// Operation lifecycle tests
///
/// These integration tests drive complete operation state machines through
/// the orchestration layer: creation, step resolution, transitions,
/// cancellation and expiration-adjacent conflicts.

fn update(
    operation_id: &str,
    auth_method: AuthMethod,
    step_result: AuthStepResult,
) -> UpdateOperationRequest {
    UpdateOperationRequest {
        operation_id: operation_id.to_string(),
        user_id: Some(TEST_USER.to_string()),
        organization_id: None,
        auth_method: Some(auth_method),
        auth_step_result: Some(step_result),
        target_auth_method: None,
    }
}

#[tokio::test]
async fn test_full_payment_flow_password_then_sms() {
    let harness = TestHarness::with_rules(payment_rules()).await;
    harness.enable_standard_user();

    let operation_id = harness.create_operation("payment").await;
    let detail = harness
        .orchestrator
        .get_operation_detail(&operation_id)
        .await
        .unwrap();
    assert_eq!(detail.result, OperationResult::Continue);
    assert_eq!(
        detail.steps,
        vec![OperationStep::new(AuthMethod::UsernamePassword)]
    );

    // Password confirmed: the second factor choices open up.
    let second = harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::UsernamePassword,
            AuthStepResult::Confirmed,
        ))
        .await
        .unwrap();
    assert_eq!(second.result, OperationResult::Continue);
    assert_eq!(
        second.steps,
        vec![
            OperationStep::new(AuthMethod::SmsOtp),
            OperationStep::new(AuthMethod::MobileToken),
        ]
    );

    // SMS code confirmed: the operation finishes.
    let done = harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::SmsOtp,
            AuthStepResult::Confirmed,
        ))
        .await
        .unwrap();
    assert_eq!(done.result, OperationResult::Done);

    // The history starts with the synthetic INIT round and counts up.
    let history = harness.operations.get_history(&operation_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].request_auth_method, AuthMethod::Init);
    assert_eq!(history[0].request_step_result, AuthStepResult::Confirmed);
    assert_eq!(
        history.iter().map(|e| e.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_create_login_with_single_rule() {
    let harness = TestHarness::with_rules(vec![rule(
        "login",
        OperationType::Create,
        None,
        None,
        AuthMethod::LoginSca,
        OperationResult::Continue,
        10,
    )])
    .await;

    let operation_id = harness.create_operation("login").await;
    let detail = harness
        .orchestrator
        .get_operation_detail(&operation_id)
        .await
        .unwrap();
    assert_eq!(detail.result, OperationResult::Continue);
    assert_eq!(detail.steps, vec![OperationStep::new(AuthMethod::LoginSca)]);
}

#[tokio::test]
async fn test_cancellation_is_idempotent_but_conflicts_with_other_calls() {
    let harness = TestHarness::with_rules(payment_rules()).await;
    harness.enable_standard_user();
    let operation_id = harness.create_operation("payment").await;

    let canceled = harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::UsernamePassword,
            AuthStepResult::Canceled,
        ))
        .await
        .unwrap();
    assert_eq!(canceled.result, OperationResult::Failed);
    assert_eq!(
        canceled.result_description.as_deref(),
        Some("operation.canceled")
    );

    // Cancel again: same answer, no new round.
    let again = harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::UsernamePassword,
            AuthStepResult::Canceled,
        ))
        .await
        .unwrap();
    assert_eq!(again.result, OperationResult::Failed);
    let history = harness.operations.get_history(&operation_id).await.unwrap();
    assert_eq!(history.len(), 2);

    // Anything else on the canceled operation is a conflict.
    let err = harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::UsernamePassword,
            AuthStepResult::Confirmed,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Engine(EngineError::AlreadyCanceled)
    ));
}

#[tokio::test]
async fn test_cancel_after_non_cancellation_failure_rejected() {
    let harness = TestHarness::with_rules(payment_rules()).await;
    harness.enable_standard_user();
    let operation_id = harness.create_operation("payment").await;

    let failed = harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::UsernamePassword,
            AuthStepResult::AuthMethodFailed,
        ))
        .await
        .unwrap();
    assert_eq!(failed.result, OperationResult::Failed);

    let err = harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::UsernamePassword,
            AuthStepResult::Canceled,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Engine(EngineError::AlreadyFailed)
    ));
}

#[tokio::test]
async fn test_unadvertised_method_rejected() {
    let harness = TestHarness::with_rules(payment_rules()).await;
    harness.enable_standard_user();
    let operation_id = harness.create_operation("payment").await;

    // Only the password step is advertised at this point.
    let err = harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::SmsOtp,
            AuthStepResult::Confirmed,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Engine(EngineError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_priority_collision_is_a_configuration_error() {
    let harness = TestHarness::with_rules(vec![
        rule(
            "login",
            OperationType::Create,
            None,
            None,
            AuthMethod::LoginSca,
            OperationResult::Continue,
            10,
        ),
        rule(
            "login",
            OperationType::Create,
            None,
            None,
            AuthMethod::UsernamePassword,
            OperationResult::Continue,
            10,
        ),
    ])
    .await;

    let err = harness
        .orchestrator
        .create_operation(authstep::CreateOperationRequest {
            operation_id: None,
            operation_name: "login".to_string(),
            operation_data: "A1".to_string(),
            external_transaction_id: None,
            organization_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Engine(EngineError::InvalidConfiguration(_))
    ));
}

#[tokio::test]
async fn test_downgrade_from_mobile_token_to_sms() {
    let harness = TestHarness::with_rules(payment_rules()).await;
    harness.enable_standard_user();
    let operation_id = harness.create_operation("payment").await;

    harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::UsernamePassword,
            AuthStepResult::Confirmed,
        ))
        .await
        .unwrap();

    let mut request = update(
        &operation_id,
        AuthMethod::MobileToken,
        AuthStepResult::AuthMethodDowngrade,
    );
    request.target_auth_method = Some(AuthMethod::SmsOtp);
    let downgraded = harness.orchestrator.update_operation(request).await.unwrap();

    assert_eq!(downgraded.result, OperationResult::Continue);
    assert_eq!(downgraded.steps, vec![OperationStep::new(AuthMethod::SmsOtp)]);
}

#[tokio::test]
async fn test_chosen_mobile_token_registers_companion_operation() {
    let harness = TestHarness::with_rules(payment_rules()).await;
    harness.enable_standard_user();
    let operation_id = harness.create_operation("payment").await;

    harness
        .orchestrator
        .update_operation(update(
            &operation_id,
            AuthMethod::UsernamePassword,
            AuthStepResult::Confirmed,
        ))
        .await
        .unwrap();

    let mut request = update(
        &operation_id,
        AuthMethod::SmsOtp,
        AuthStepResult::AuthMethodChosen,
    );
    request.target_auth_method = Some(AuthMethod::MobileToken);
    let chosen = harness.orchestrator.update_operation(request).await.unwrap();

    assert_eq!(chosen.result, OperationResult::Continue);
    assert_eq!(chosen.chosen_auth_method, Some(AuthMethod::MobileToken));
    // The advertised steps survive the choice unchanged.
    assert_eq!(
        chosen.steps,
        vec![
            OperationStep::new(AuthMethod::SmsOtp),
            OperationStep::new(AuthMethod::MobileToken),
        ]
    );
    assert!(chosen.mobile_token_operation_id.is_some());
    assert_eq!(harness.mobile.registrations().len(), 1);

    // The choice is visible in the detail view.
    let detail = harness
        .orchestrator
        .get_operation_detail(&operation_id)
        .await
        .unwrap();
    assert_eq!(detail.chosen_auth_method, Some(AuthMethod::MobileToken));
}

#[tokio::test]
async fn test_chosen_mobile_token_without_bound_user_fails() {
    // No user binds to the operation, so no activation can back the choice.
    let harness = TestHarness::with_rules(payment_rules()).await;
    let operation_id = harness.create_operation("payment").await;

    let mut first = update(
        &operation_id,
        AuthMethod::UsernamePassword,
        AuthStepResult::Confirmed,
    );
    first.user_id = None;
    harness.orchestrator.update_operation(first).await.unwrap();

    let mut request = update(
        &operation_id,
        AuthMethod::SmsOtp,
        AuthStepResult::AuthMethodChosen,
    );
    request.user_id = None;
    request.target_auth_method = Some(AuthMethod::MobileToken);
    let chosen = harness.orchestrator.update_operation(request).await.unwrap();

    assert_eq!(chosen.result, OperationResult::Failed);
    assert_eq!(
        chosen.result_description.as_deref(),
        Some("operation.methodNotAvailable")
    );
}
