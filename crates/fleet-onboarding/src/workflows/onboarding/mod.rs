//! Driver onboarding: public intake, token-gated induction form, staff approval and
//! identity link repair.

pub mod credentials;
pub mod documents;
pub mod domain;
pub mod errors;
pub mod memory;
pub mod payloads;
pub mod policy;
pub(crate) mod reconcile;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use documents::{DocumentOutcome, DocumentOutcomeStatus, DocumentPolicy};
pub use domain::{
    AccountStatus, ApplicationId, ApplicationRecord, ApplicationStatus, ComplianceDocument,
    ComplianceStatus, Contact, ContactId, ContactType, DocumentType, DriverCode, DriverId,
    DriverProfile, DriverStatus, FleetSize, Identity, IdentityId, InductionToken, Role,
};
pub use errors::OnboardingError;
pub use memory::{InMemoryOnboardingStore, RecordCounts};
pub use payloads::{
    ApplicationReceipt, ApplicationSubmission, ApprovalResult, DocumentUpload, DriverView,
    IdentityView, InductionAccess, InductionLinkReceipt, InductionResult, InductionSubmission,
    LinkOutcome, LinkRepair, TokenCheck,
};
pub use policy::{Clock, OnboardingPolicy, SystemClock, DRIVER_PERMISSIONS};
pub use repository::{
    ApplicationEmail, ApprovedEmail, DocumentStore, DocumentStoreError, InductionSubmittedEmail,
    Mailer, NotificationError, OnboardingStore, StoreError,
};
pub use router::{onboarding_router, IDENTITY_HEADER, STAFF_HEADER};
pub use service::DriverOnboardingService;
