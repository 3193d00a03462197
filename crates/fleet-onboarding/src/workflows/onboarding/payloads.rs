//! Wire shapes for the onboarding endpoints.
//!
//! Request fields are all optional so that missing values surface as field-level
//! validation errors rather than body rejections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::credentials::SecretInput;
use super::documents::DocumentOutcome;
use super::domain::{
    ApplicationId, ComplianceStatus, DriverCode, DriverId, DriverProfile, DriverStatus, Identity,
    IdentityId,
};

/// Public recruitment form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSubmission {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub suburb: Option<String>,
    pub state_region: Option<String>,
    pub postcode: Option<String>,
    pub company_name: Option<String>,
    pub contact_type: Option<String>,
    /// JSON array or a string holding one.
    pub services_provided: Option<Value>,
    pub vehicle_types_in_fleet: Option<Value>,
    pub fleet_size: Option<String>,
    /// Optional starting status; only `PENDING_RECRUIT` and `NEW_RECRUIT` are accepted.
    pub driver_status: Option<String>,
}

/// Detailed induction form, reached through the emailed link or while signed in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InductionSubmission {
    pub token: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretInput>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub state_region: Option<String>,
    pub postcode: Option<String>,
    pub company_name: Option<String>,
    /// Australian Business Number.
    #[serde(alias = "taxId")]
    pub abn: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_bsb: Option<String>,
    pub bank_account_number: Option<String>,
    pub license_number: Option<String>,
    pub license_expiry: Option<String>,
    pub motor_insurance_policy_number: Option<String>,
    pub motor_insurance_expiry: Option<String>,
    pub public_liability_policy_number: Option<String>,
    pub public_liability_expiry: Option<String>,
    pub marine_cargo_policy_number: Option<String>,
    pub marine_cargo_expiry: Option<String>,
    pub workers_comp_policy_number: Option<String>,
    pub workers_comp_expiry: Option<String>,
    pub services_provided: Option<Value>,
    pub vehicle_types_in_fleet: Option<Value>,
    #[serde(default)]
    pub documents: Vec<DocumentUpload>,
}

/// Base64-encoded file attached to the induction form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    pub document_type: String,
    pub file_name: String,
    pub mime_type: String,
    pub content_base64: String,
}

/// How an induction submission proves who it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InductionAccess {
    /// Raw token from the emailed link.
    Token(String),
    /// Identity of a signed-in driver.
    Authenticated(IdentityId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSummary {
    pub id: DriverId,
    pub driver_code: DriverCode,
    pub driver_status: DriverStatus,
    pub compliance_status: ComplianceStatus,
}

impl From<&DriverProfile> for DriverSummary {
    fn from(driver: &DriverProfile) -> Self {
        Self {
            id: driver.id.clone(),
            driver_code: driver.driver_code.clone(),
            driver_status: driver.driver_status(),
            compliance_status: driver.compliance_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationReceipt {
    pub application_id: ApplicationId,
    pub email: String,
    pub driver: DriverSummary,
}

/// Token check answered before the induction form is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCheck {
    pub valid: bool,
    pub email: String,
    pub application_id: ApplicationId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InductionResult {
    pub driver: DriverView,
    pub documents: Vec<DocumentOutcome>,
}

/// Driver state as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverView {
    pub id: DriverId,
    pub driver_code: DriverCode,
    pub email: String,
    pub identity_id: Option<IdentityId>,
    pub driver_status: DriverStatus,
    pub compliance_status: ComplianceStatus,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub induction_submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<IdentityId>,
}

impl From<&DriverProfile> for DriverView {
    fn from(driver: &DriverProfile) -> Self {
        Self {
            id: driver.id.clone(),
            driver_code: driver.driver_code.clone(),
            email: driver.email.clone(),
            identity_id: driver.identity_id.clone(),
            driver_status: driver.driver_status(),
            compliance_status: driver.compliance_status,
            is_active: driver.is_active(),
            induction_submitted_at: driver.induction_submitted_at,
            approved_at: driver.approved_at,
            approved_by: driver.approved_by.clone(),
        }
    }
}

/// Account fields safe to return to staff. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub id: IdentityId,
    pub email: String,
    pub username: String,
    pub status: &'static str,
}

impl From<&Identity> for IdentityView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            username: identity.username.clone(),
            status: identity.status.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResult {
    pub driver: DriverView,
    pub user: IdentityView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkOutcome {
    AlreadyLinked,
    Relinked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRepair {
    pub outcome: LinkOutcome,
    pub message: String,
    pub driver: DriverView,
    pub user: IdentityView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InductionLinkReceipt {
    pub application_id: ApplicationId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}
