use std::sync::Arc;

use chrono::Utc;

use authstep::{
    AuthMethod, AuthMethodConfig, AuthStepResult, CatalogSnapshot, CreateOperationRequest,
    Credential, CredentialStatus, MemoryCredentialStore, MemoryDelegatedAuthenticator,
    MemoryMobileTokenService, MemoryOperationStore, MemoryOtpStore, MemoryUserPreferences,
    OperationResult, OperationType, Orchestrator, Otp, OtpStatus, SecretProtection,
    Sha256SecretProtection, StepCatalog, StepDefinition,
};

/// Everything an end-to-end flow test needs: the orchestrator plus handles
/// on all in-memory collaborators for seeding and assertions.
pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub catalog: Arc<StepCatalog>,
    pub operations: Arc<MemoryOperationStore>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub otps: Arc<MemoryOtpStore>,
    pub preferences: Arc<MemoryUserPreferences>,
    pub mobile: Arc<MemoryMobileTokenService>,
    pub delegate: Arc<MemoryDelegatedAuthenticator>,
}

impl TestHarness {
    /// Harness with the given step rules loaded and no method policies.
    pub async fn with_rules(rules: Vec<StepDefinition>) -> Self {
        Self::with_snapshot(CatalogSnapshot {
            step_definitions: rules,
            method_policies: Vec::new(),
            response_ttl_overrides: Vec::new(),
        })
        .await
    }

    pub async fn with_snapshot(snapshot: CatalogSnapshot) -> Self {
        let preferences = Arc::new(MemoryUserPreferences::new());
        let mobile = Arc::new(MemoryMobileTokenService::new());
        let catalog = Arc::new(StepCatalog::new(preferences.clone(), mobile.clone()));
        catalog.reload(snapshot).await;
        let operations = Arc::new(MemoryOperationStore::new());
        let credentials = Arc::new(MemoryCredentialStore::new());
        let otps = Arc::new(MemoryOtpStore::new());
        let delegate = Arc::new(MemoryDelegatedAuthenticator::new());
        let orchestrator = Orchestrator::new(
            catalog.clone(),
            operations.clone(),
            credentials.clone(),
            otps.clone(),
            preferences.clone(),
            mobile.clone(),
            Arc::new(Sha256SecretProtection::new()),
            delegate.clone(),
        );
        Self {
            orchestrator,
            catalog,
            operations,
            credentials,
            otps,
            preferences,
            mobile,
            delegate,
        }
    }

    /// Enable the usual methods for the standard test user, with a live
    /// mobile-token activation.
    pub fn enable_standard_user(&self) {
        self.preferences.enable_method(
            TEST_USER,
            AuthMethod::UsernamePassword,
            AuthMethodConfig::default(),
        );
        self.preferences
            .enable_method(TEST_USER, AuthMethod::SmsOtp, AuthMethodConfig::default());
        self.preferences.enable_method(
            TEST_USER,
            AuthMethod::MobileToken,
            AuthMethodConfig {
                max_auth_fails: None,
                activation_id: Some(TEST_ACTIVATION.to_string()),
            },
        );
        self.mobile.activate(TEST_ACTIVATION);
    }

    pub async fn create_operation(&self, operation_name: &str) -> String {
        self.orchestrator
            .create_operation(CreateOperationRequest {
                operation_id: None,
                operation_name: operation_name.to_string(),
                operation_data: "A1*A100CZK*Q238400856".to_string(),
                external_transaction_id: None,
                organization_id: None,
            })
            .await
            .expect("operation creation failed")
            .operation_id
    }
}

pub const TEST_USER: &str = "test_user";
pub const TEST_ACTIVATION: &str = "test_activation";

pub fn rule(
    operation_name: &str,
    operation_type: OperationType,
    request_step_result: Option<AuthStepResult>,
    request_auth_method: Option<AuthMethod>,
    response_auth_method: AuthMethod,
    response_result: OperationResult,
    priority: u32,
) -> StepDefinition {
    StepDefinition {
        operation_name: operation_name.to_string(),
        operation_type,
        request_step_result,
        request_auth_method,
        response_auth_method,
        response_result,
        priority,
    }
}

/// A two-factor payment: password first, then either an SMS code or the
/// mobile token, retry on a failed attempt, operation failure when a method
/// fails out.
pub fn payment_rules() -> Vec<StepDefinition> {
    vec![
        rule(
            "payment",
            OperationType::Create,
            None,
            None,
            AuthMethod::UsernamePassword,
            OperationResult::Continue,
            10,
        ),
        rule(
            "payment",
            OperationType::Update,
            Some(AuthStepResult::Confirmed),
            Some(AuthMethod::UsernamePassword),
            AuthMethod::SmsOtp,
            OperationResult::Continue,
            10,
        ),
        rule(
            "payment",
            OperationType::Update,
            Some(AuthStepResult::Confirmed),
            Some(AuthMethod::UsernamePassword),
            AuthMethod::MobileToken,
            OperationResult::Continue,
            20,
        ),
        rule(
            "payment",
            OperationType::Update,
            Some(AuthStepResult::AuthFailed),
            Some(AuthMethod::UsernamePassword),
            AuthMethod::UsernamePassword,
            OperationResult::Continue,
            30,
        ),
        rule(
            "payment",
            OperationType::Update,
            Some(AuthStepResult::Confirmed),
            Some(AuthMethod::SmsOtp),
            AuthMethod::Init,
            OperationResult::Done,
            10,
        ),
        rule(
            "payment",
            OperationType::Update,
            Some(AuthStepResult::AuthFailed),
            Some(AuthMethod::SmsOtp),
            AuthMethod::SmsOtp,
            OperationResult::Continue,
            20,
        ),
        rule(
            "payment",
            OperationType::Update,
            Some(AuthStepResult::Confirmed),
            Some(AuthMethod::MobileToken),
            AuthMethod::Init,
            OperationResult::Done,
            10,
        ),
        rule(
            "payment",
            OperationType::Update,
            Some(AuthStepResult::AuthMethodDowngrade),
            Some(AuthMethod::MobileToken),
            AuthMethod::SmsOtp,
            OperationResult::Continue,
            10,
        ),
        rule(
            "payment",
            OperationType::Update,
            Some(AuthStepResult::AuthMethodFailed),
            Some(AuthMethod::SmsOtp),
            AuthMethod::Init,
            OperationResult::Failed,
            30,
        ),
        rule(
            "payment",
            OperationType::Update,
            Some(AuthStepResult::AuthMethodFailed),
            Some(AuthMethod::UsernamePassword),
            AuthMethod::Init,
            OperationResult::Failed,
            40,
        ),
    ]
}

/// An active credential protected with SHA-256.
pub fn pin_credential(user_id: &str, value: &str) -> Credential {
    let protected = Sha256SecretProtection::new()
        .protect(value)
        .expect("protect failed");
    Credential {
        credential_id: "test_credential".to_string(),
        credential_name: "PIN".to_string(),
        user_id: user_id.to_string(),
        status: CredentialStatus::Active,
        protected_value: protected.value,
        algorithm: protected.algorithm,
        attempt_counter: 0,
        failed_attempt_counter_soft: 0,
        failed_attempt_counter_hard: 0,
        soft_limit: Some(5),
        hard_limit: Some(10),
        blocked_at: None,
        proxy_enabled: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// An active SMS OTP bound to the given user and operation.
pub fn sms_otp(otp_id: &str, user_id: &str, operation_id: &str, value: &str) -> Otp {
    let protected = Sha256SecretProtection::new()
        .protect(value)
        .expect("protect failed");
    Otp {
        otp_id: otp_id.to_string(),
        otp_name: "SMS_CODE".to_string(),
        user_id: Some(user_id.to_string()),
        operation_id: Some(operation_id.to_string()),
        status: OtpStatus::Active,
        protected_value: protected.value,
        algorithm: protected.algorithm,
        attempt_counter: 0,
        failed_attempt_counter: 0,
        attempt_limit: Some(3),
        expires_at: None,
        proxy_enabled: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
