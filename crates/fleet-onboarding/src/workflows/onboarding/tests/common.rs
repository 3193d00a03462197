use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use url::Url;

use crate::config::OnboardingConfig;
use crate::workflows::onboarding::domain::{
    ApplicationId, ApplicationRecord, ComplianceDocument, Contact, ContactId, DriverCode,
    DriverId, DriverProfile, DriverStatus, Identity, IdentityId, InductionToken,
};
use crate::workflows::onboarding::payloads::{
    ApplicationReceipt, ApplicationSubmission, DocumentUpload, InductionAccess,
    InductionSubmission,
};
use crate::workflows::onboarding::policy::{Clock, OnboardingPolicy};
use crate::workflows::onboarding::repository::{
    ApplicationEmail, ApplicationStore, ApprovedEmail, ComplianceDocumentStore, ContactStore,
    DocumentStore, DocumentStoreError, DriverProfileStore, IdentityStore, InductionSubmittedEmail,
    InductionTokenStore, Mailer, NotificationError, StoreError,
};
use crate::workflows::onboarding::{DriverOnboardingService, InMemoryOnboardingStore};

pub(super) const DEFAULT_PASSWORD: &str = "Welcome2Fleet!";
pub(super) const MAX_DOCUMENT_BYTES: usize = 1024;

pub(super) type TestService =
    DriverOnboardingService<InMemoryOnboardingStore, MemoryDocuments, RecordingMailer>;

pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[derive(Debug, Clone)]
pub(super) enum SentEmail {
    Application(ApplicationEmail),
    InductionSubmitted(InductionSubmittedEmail),
    Approved(ApprovedEmail),
}

#[derive(Default)]
pub(super) struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub(super) fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(super) fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }

    pub(super) fn approvals(&self) -> Vec<ApprovedEmail> {
        self.sent()
            .into_iter()
            .filter_map(|email| match email {
                SentEmail::Approved(email) => Some(email),
                _ => None,
            })
            .collect()
    }

    pub(super) fn submissions(&self) -> Vec<InductionSubmittedEmail> {
        self.sent()
            .into_iter()
            .filter_map(|email| match email {
                SentEmail::InductionSubmitted(email) => Some(email),
                _ => None,
            })
            .collect()
    }

    /// Token carried by the most recent induction link sent to `to`.
    pub(super) fn latest_token_for(&self, to: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|email| match email {
            SentEmail::Application(email) if email.to == to => {
                let link = Url::parse(&email.induction_link).ok()?;
                link.query_pairs()
                    .find(|(key, _)| key == "token")
                    .map(|(_, value)| value.into_owned())
            }
            _ => None,
        })
    }

    fn record(&self, email: SentEmail) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp relay offline".to_string()));
        }
        self.sent.lock().expect("mailer mutex poisoned").push(email);
        Ok(())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_application_email(
        &self,
        email: ApplicationEmail,
    ) -> Result<(), NotificationError> {
        self.record(SentEmail::Application(email))
    }

    async fn send_induction_submitted_email(
        &self,
        email: InductionSubmittedEmail,
    ) -> Result<(), NotificationError> {
        self.record(SentEmail::InductionSubmitted(email))
    }

    async fn send_approved_email(&self, email: ApprovedEmail) -> Result<(), NotificationError> {
        self.record(SentEmail::Approved(email))
    }
}

#[derive(Default)]
pub(super) struct MemoryDocuments {
    uploads: Mutex<Vec<(String, usize)>>,
    failing: AtomicBool,
}

impl MemoryDocuments {
    pub(super) fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(super) fn keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .expect("documents mutex poisoned")
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn upload_document(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _mime_type: &str,
    ) -> Result<String, DocumentStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::Unavailable("bucket offline".to_string()));
        }
        self.uploads
            .lock()
            .expect("documents mutex poisoned")
            .push((key.to_string(), bytes.len()));
        Ok(format!("memory://{key}"))
    }
}

/// How [`FlakyStore`] fails identity updates while armed.
#[derive(Debug, Clone, Copy)]
pub(super) enum IdentityWriteFailure {
    Conflict,
    Unavailable,
}

/// In-memory store whose identity updates can be made to fail.
#[derive(Default)]
pub(super) struct FlakyStore {
    inner: InMemoryOnboardingStore,
    identity_writes: Mutex<Option<IdentityWriteFailure>>,
}

impl FlakyStore {
    pub(super) fn fail_identity_writes(&self, failure: Option<IdentityWriteFailure>) {
        *self.identity_writes.lock().expect("store mutex poisoned") = failure;
    }
}

#[async_trait]
impl IdentityStore for FlakyStore {
    async fn find_identity(&self, id: &IdentityId) -> Result<Option<Identity>, StoreError> {
        self.inner.find_identity(id).await
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        self.inner.find_identity_by_email(email).await
    }

    async fn find_identity_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Identity>, StoreError> {
        self.inner.find_identity_by_username(username).await
    }

    async fn insert_identity(&self, identity: Identity) -> Result<Identity, StoreError> {
        self.inner.insert_identity(identity).await
    }

    async fn update_identity(&self, identity: Identity) -> Result<Identity, StoreError> {
        let failure = *self.identity_writes.lock().expect("store mutex poisoned");
        match failure {
            Some(IdentityWriteFailure::Conflict) => Err(StoreError::Conflict),
            Some(IdentityWriteFailure::Unavailable) => {
                Err(StoreError::Unavailable("primary stepped down".to_string()))
            }
            None => self.inner.update_identity(identity).await,
        }
    }
}

#[async_trait]
impl ContactStore for FlakyStore {
    async fn find_contact(&self, id: &ContactId) -> Result<Option<Contact>, StoreError> {
        self.inner.find_contact(id).await
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, StoreError> {
        self.inner.find_contact_by_email(email).await
    }

    async fn insert_contact(&self, contact: Contact) -> Result<Contact, StoreError> {
        self.inner.insert_contact(contact).await
    }

    async fn update_contact(&self, contact: Contact) -> Result<Contact, StoreError> {
        self.inner.update_contact(contact).await
    }
}

#[async_trait]
impl DriverProfileStore for FlakyStore {
    async fn find_driver(&self, id: &DriverId) -> Result<Option<DriverProfile>, StoreError> {
        self.inner.find_driver(id).await
    }

    async fn find_driver_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<DriverProfile>, StoreError> {
        self.inner.find_driver_by_identity(identity_id).await
    }

    async fn find_driver_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<DriverProfile>, StoreError> {
        self.inner.find_driver_by_contact(contact_id).await
    }

    async fn insert_driver(&self, driver: DriverProfile) -> Result<DriverProfile, StoreError> {
        self.inner.insert_driver(driver).await
    }

    async fn update_driver(&self, driver: DriverProfile) -> Result<DriverProfile, StoreError> {
        self.inner.update_driver(driver).await
    }

    async fn next_driver_code(&self) -> Result<DriverCode, StoreError> {
        self.inner.next_driver_code().await
    }

    async fn drivers_with_status(
        &self,
        status: DriverStatus,
        limit: usize,
    ) -> Result<Vec<DriverProfile>, StoreError> {
        self.inner.drivers_with_status(status, limit).await
    }
}

#[async_trait]
impl ApplicationStore for FlakyStore {
    async fn insert_application(
        &self,
        application: ApplicationRecord,
    ) -> Result<ApplicationRecord, StoreError> {
        self.inner.insert_application(application).await
    }

    async fn find_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        self.inner.find_application(id).await
    }

    async fn latest_pending_application(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        self.inner.latest_pending_application(driver_id).await
    }

    async fn complete_application(
        &self,
        id: &ApplicationId,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        self.inner.complete_application(id, completed_at).await
    }
}

#[async_trait]
impl InductionTokenStore for FlakyStore {
    async fn insert_token(&self, token: InductionToken) -> Result<InductionToken, StoreError> {
        self.inner.insert_token(token).await
    }

    async fn find_token(&self, token_hash: &str) -> Result<Option<InductionToken>, StoreError> {
        self.inner.find_token(token_hash).await
    }

    async fn consume_token(
        &self,
        token_hash: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InductionToken>, StoreError> {
        self.inner.consume_token(token_hash, email, now).await
    }

    async fn release_token(&self, token_hash: &str) -> Result<bool, StoreError> {
        self.inner.release_token(token_hash).await
    }
}

#[async_trait]
impl ComplianceDocumentStore for FlakyStore {
    async fn insert_document(
        &self,
        document: ComplianceDocument,
    ) -> Result<ComplianceDocument, StoreError> {
        self.inner.insert_document(document).await
    }

    async fn documents_for_driver(
        &self,
        driver_id: &DriverId,
    ) -> Result<Vec<ComplianceDocument>, StoreError> {
        self.inner.documents_for_driver(driver_id).await
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) store: Arc<InMemoryOnboardingStore>,
    pub(super) mailer: Arc<RecordingMailer>,
    pub(super) documents: Arc<MemoryDocuments>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn policy() -> OnboardingPolicy {
    OnboardingPolicy::from_config(&OnboardingConfig {
        portal_url: "https://portal.fleet.test/induction".to_string(),
        max_document_bytes: MAX_DOCUMENT_BYTES,
        ..OnboardingConfig::default()
    })
    .expect("valid onboarding config")
}

pub(super) fn harness() -> Harness {
    harness_with_policy(policy())
}

pub(super) fn harness_with_policy(policy: OnboardingPolicy) -> Harness {
    let store = Arc::new(InMemoryOnboardingStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let documents = Arc::new(MemoryDocuments::default());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
            .single()
            .expect("valid timestamp"),
    ));
    let service = DriverOnboardingService::new(
        store.clone(),
        documents.clone(),
        mailer.clone(),
        policy,
    )
    .with_clock(clock.clone());

    Harness {
        service: Arc::new(service),
        store,
        mailer,
        documents,
        clock,
    }
}

pub(super) fn application(email: &str) -> ApplicationSubmission {
    ApplicationSubmission {
        email: Some(email.to_string()),
        first_name: Some("A".to_string()),
        last_name: Some("B".to_string()),
        phone: Some("0400 111 222".to_string()),
        suburb: Some("X".to_string()),
        state_region: Some("NSW".to_string()),
        postcode: Some("2000".to_string()),
        contact_type: Some("Owner Operator".to_string()),
        services_provided: Some(json!(["Courier"])),
        vehicle_types_in_fleet: Some(json!(["Van"])),
        fleet_size: Some("1 to 5".to_string()),
        ..ApplicationSubmission::default()
    }
}

pub(super) fn induction(email: &str, token: Option<&str>) -> InductionSubmission {
    InductionSubmission {
        token: token.map(str::to_string),
        email: Some(email.to_string()),
        address: Some("1 Depot Rd".to_string()),
        abn: Some("51 824 753 556".to_string()),
        bank_account_name: Some("A B Transport".to_string()),
        bank_bsb: Some("062-000".to_string()),
        bank_account_number: Some("12345678".to_string()),
        license_number: Some("NSW1234567".to_string()),
        license_expiry: Some("2027-06-30".to_string()),
        motor_insurance_policy_number: Some("MI-998".to_string()),
        motor_insurance_expiry: Some("2026-01-31".to_string()),
        ..InductionSubmission::default()
    }
}

pub(super) fn pdf_upload(document_type: &str) -> DocumentUpload {
    DocumentUpload {
        document_type: document_type.to_string(),
        file_name: format!("{document_type}.pdf"),
        mime_type: "application/pdf".to_string(),
        content_base64: STANDARD.encode(b"%PDF-1.7 test document"),
    }
}

pub(super) async fn seed_staff(harness: &Harness) -> IdentityId {
    let staff = Identity::staff("ops@fleet.test", "ops", harness.clock.now());
    harness
        .store
        .insert_identity(staff)
        .await
        .expect("staff seeded")
        .id
}

/// Submits an application and returns the receipt with the emailed token.
pub(super) async fn apply(harness: &Harness, email: &str) -> (ApplicationReceipt, String) {
    let receipt = harness
        .service
        .submit_application(application(email))
        .await
        .expect("application accepted");
    let token = harness
        .mailer
        .latest_token_for(email)
        .expect("induction link emailed");
    (receipt, token)
}

/// Application followed by staff shortlisting, leaving the driver at `NEW_RECRUIT`.
pub(super) async fn shortlisted(
    harness: &Harness,
    email: &str,
    staff: &IdentityId,
) -> (DriverId, String) {
    let (receipt, token) = apply(harness, email).await;
    harness
        .service
        .shortlist_recruit(&receipt.driver.id, staff)
        .await
        .expect("shortlisted");
    (receipt.driver.id, token)
}

/// Drives a recruit all the way to `PENDING_INDUCTION`.
pub(super) async fn inducted(harness: &Harness, email: &str, staff: &IdentityId) -> DriverId {
    let (driver_id, token) = shortlisted(harness, email, staff).await;
    harness
        .service
        .submit_induction_form(
            induction(email, Some(&token)),
            InductionAccess::Token(token.clone()),
        )
        .await
        .expect("induction accepted");
    driver_id
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
