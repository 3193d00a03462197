use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    ApplicationId, ApplicationRecord, ComplianceDocument, Contact, ContactId, DriverCode,
    DriverId, DriverProfile, DriverStatus, Identity, IdentityId, InductionToken,
};

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Login accounts. Email and username are unique.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_identity(&self, id: &IdentityId) -> Result<Option<Identity>, StoreError>;
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;
    async fn find_identity_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Identity>, StoreError>;
    /// Fails with [`StoreError::Conflict`] when the email or username is taken.
    async fn insert_identity(&self, identity: Identity) -> Result<Identity, StoreError>;
    /// Returns the document as persisted.
    async fn update_identity(&self, identity: Identity) -> Result<Identity, StoreError>;
}

/// Contact profiles, one per email.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn find_contact(&self, id: &ContactId) -> Result<Option<Contact>, StoreError>;
    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, StoreError>;
    async fn insert_contact(&self, contact: Contact) -> Result<Contact, StoreError>;
    async fn update_contact(&self, contact: Contact) -> Result<Contact, StoreError>;
}

/// Driver profiles. At most one per contact and one per identity; driver codes are unique.
#[async_trait]
pub trait DriverProfileStore: Send + Sync {
    async fn find_driver(&self, id: &DriverId) -> Result<Option<DriverProfile>, StoreError>;
    async fn find_driver_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<DriverProfile>, StoreError>;
    async fn find_driver_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<DriverProfile>, StoreError>;
    async fn insert_driver(&self, driver: DriverProfile) -> Result<DriverProfile, StoreError>;
    async fn update_driver(&self, driver: DriverProfile) -> Result<DriverProfile, StoreError>;
    /// Atomically reserves the next sequential driver code.
    async fn next_driver_code(&self) -> Result<DriverCode, StoreError>;
    /// Oldest first.
    async fn drivers_with_status(
        &self,
        status: DriverStatus,
        limit: usize,
    ) -> Result<Vec<DriverProfile>, StoreError>;
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn insert_application(
        &self,
        application: ApplicationRecord,
    ) -> Result<ApplicationRecord, StoreError>;
    async fn find_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, StoreError>;
    async fn latest_pending_application(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<ApplicationRecord>, StoreError>;
    /// Marks the application completed. Completing an already completed application is a no-op.
    async fn complete_application(
        &self,
        id: &ApplicationId,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<ApplicationRecord>, StoreError>;
}

#[async_trait]
pub trait InductionTokenStore: Send + Sync {
    async fn insert_token(&self, token: InductionToken) -> Result<InductionToken, StoreError>;
    async fn find_token(&self, token_hash: &str) -> Result<Option<InductionToken>, StoreError>;
    /// Conditional update: marks the token used only if it is unused, unexpired and bound
    /// to `email`. Returns `None` when any of those checks fail, so exactly one of two
    /// concurrent redemptions wins.
    async fn consume_token(
        &self,
        token_hash: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InductionToken>, StoreError>;
    /// Conditional update undoing a claim: marks a used token unused again. Returns `false`
    /// when the token is missing or was not used.
    async fn release_token(&self, token_hash: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ComplianceDocumentStore: Send + Sync {
    async fn insert_document(
        &self,
        document: ComplianceDocument,
    ) -> Result<ComplianceDocument, StoreError>;
    async fn documents_for_driver(
        &self,
        driver_id: &DriverId,
    ) -> Result<Vec<ComplianceDocument>, StoreError>;
}

/// Everything the onboarding workflow persists.
pub trait OnboardingStore:
    IdentityStore
    + ContactStore
    + DriverProfileStore
    + ApplicationStore
    + InductionTokenStore
    + ComplianceDocumentStore
{
}

impl<T> OnboardingStore for T where
    T: IdentityStore
        + ContactStore
        + DriverProfileStore
        + ApplicationStore
        + InductionTokenStore
        + ComplianceDocumentStore
{
}

/// Blob storage for uploaded compliance files.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores `bytes` under `key` and returns a retrievable URL.
    async fn upload_document(
        &self,
        key: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, DocumentStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("document storage rejected upload: {0}")]
    Rejected(String),
    #[error("document storage unavailable: {0}")]
    Unavailable(String),
}

/// Outbound onboarding emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_application_email(&self, email: ApplicationEmail)
        -> Result<(), NotificationError>;
    async fn send_induction_submitted_email(
        &self,
        email: InductionSubmittedEmail,
    ) -> Result<(), NotificationError>;
    async fn send_approved_email(&self, email: ApprovedEmail) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

/// Confirms receipt of an application and carries the single-use induction link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationEmail {
    pub to: String,
    pub first_name: String,
    pub induction_link: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InductionSubmittedEmail {
    pub to: String,
    pub first_name: String,
    pub driver_code: DriverCode,
}

/// Login credentials for a newly approved driver.
#[derive(Clone, PartialEq, Eq)]
pub struct ApprovedEmail {
    pub to: String,
    pub first_name: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ApprovedEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovedEmail")
            .field("to", &self.to)
            .field("first_name", &self.first_name)
            .field("username", &self.username)
            .field("password", &"**redacted**")
            .finish()
    }
}
