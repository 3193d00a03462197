use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

record_id!(
    /// Login account identifier.
    IdentityId
);
record_id!(
    /// Person/company profile identifier.
    ContactId
);
record_id!(
    /// Driver business record identifier.
    DriverId
);
record_id!(
    /// Intake submission identifier.
    ApplicationId
);
record_id!(DocumentId);

/// Human-readable, sequential driver code (`DRV-000042`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverCode(pub String);

impl DriverCode {
    pub fn from_sequence(sequence: u64) -> Self {
        Self(format!("DRV-{sequence:06}"))
    }
}

impl fmt::Display for DriverCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Customer,
    Staff,
    Admin,
}

impl Role {
    pub const fn is_staff(self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Active,
}

impl AccountStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
}

/// Login account. Never serialized directly; responses use `IdentityView`.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: IdentityId,
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub approval_status: ApprovalStatus,
    pub must_change_password: bool,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Account created at first intake: pending, unapproved, temporary credentials.
    pub fn pending_driver(email: &str, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: IdentityId::generate(),
            email: email.to_string(),
            username: email.to_string(),
            password_hash: Some(password_hash),
            role: Role::Driver,
            status: AccountStatus::Pending,
            approval_status: ApprovalStatus::Pending,
            must_change_password: true,
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn staff(email: &str, username: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: IdentityId::generate(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash: None,
            role: Role::Staff,
            status: AccountStatus::Active,
            approval_status: ApprovalStatus::Approved,
            must_change_password: false,
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Optional contact fields; `None` leaves the stored value untouched when merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDetails {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub state_region: Option<String>,
    pub postcode: Option<String>,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
}

/// Person/company profile shared by driver and customer contexts. One per email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub state_region: Option<String>,
    pub postcode: Option<String>,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(email: &str, details: &ContactDetails, now: DateTime<Utc>) -> Self {
        let mut contact = Self {
            id: ContactId::generate(),
            email: email.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            phone: None,
            address: None,
            suburb: None,
            state_region: None,
            postcode: None,
            company_name: None,
            tax_id: None,
            created_at: now,
            updated_at: now,
        };
        contact.merge(details, now);
        contact
    }

    pub fn merge(&mut self, details: &ContactDetails, now: DateTime<Utc>) {
        if let Some(first_name) = &details.first_name {
            self.first_name = first_name.clone();
        }
        if let Some(last_name) = &details.last_name {
            self.last_name = last_name.clone();
        }
        merge_field(&mut self.phone, &details.phone);
        merge_field(&mut self.address, &details.address);
        merge_field(&mut self.suburb, &details.suburb);
        merge_field(&mut self.state_region, &details.state_region);
        merge_field(&mut self.postcode, &details.postcode);
        merge_field(&mut self.company_name, &details.company_name);
        merge_field(&mut self.tax_id, &details.tax_id);
        self.updated_at = now;
    }

    pub fn greeting_name(&self) -> &str {
        if self.first_name.is_empty() {
            "there"
        } else {
            &self.first_name
        }
    }
}

fn merge_field<T: Clone>(target: &mut Option<T>, update: &Option<T>) {
    if let Some(value) = update {
        *target = Some(value.clone());
    }
}

/// Onboarding stage of a driver profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    PendingRecruit,
    NewRecruit,
    PendingInduction,
    Compliant,
}

impl DriverStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DriverStatus::PendingRecruit => "PENDING_RECRUIT",
            DriverStatus::NewRecruit => "NEW_RECRUIT",
            DriverStatus::PendingInduction => "PENDING_INDUCTION",
            DriverStatus::Compliant => "COMPLIANT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING_RECRUIT" => Some(DriverStatus::PendingRecruit),
            "NEW_RECRUIT" => Some(DriverStatus::NewRecruit),
            "PENDING_INDUCTION" => Some(DriverStatus::PendingInduction),
            "COMPLIANT" => Some(DriverStatus::Compliant),
            _ => None,
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Review state of the compliance paperwork, tracked alongside `DriverStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    NotSubmitted,
    PendingReview,
    Compliant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactType {
    #[serde(rename = "Owner Operator")]
    OwnerOperator,
    #[serde(rename = "Fleet Operator")]
    FleetOperator,
    #[serde(rename = "Subcontractor")]
    Subcontractor,
}

impl ContactType {
    pub const ALL: [ContactType; 3] = [
        ContactType::OwnerOperator,
        ContactType::FleetOperator,
        ContactType::Subcontractor,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ContactType::OwnerOperator => "Owner Operator",
            ContactType::FleetOperator => "Fleet Operator",
            ContactType::Subcontractor => "Subcontractor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.label().eq_ignore_ascii_case(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FleetSize {
    #[serde(rename = "1 to 5")]
    OneToFive,
    #[serde(rename = "6 to 10")]
    SixToTen,
    #[serde(rename = "11 to 20")]
    ElevenToTwenty,
    #[serde(rename = "21 to 50")]
    TwentyOneToFifty,
    #[serde(rename = "50+")]
    OverFifty,
}

impl FleetSize {
    pub const ALL: [FleetSize; 5] = [
        FleetSize::OneToFive,
        FleetSize::SixToTen,
        FleetSize::ElevenToTwenty,
        FleetSize::TwentyOneToFifty,
        FleetSize::OverFifty,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            FleetSize::OneToFive => "1 to 5",
            FleetSize::SixToTen => "6 to 10",
            FleetSize::ElevenToTwenty => "11 to 20",
            FleetSize::TwentyOneToFifty => "21 to 50",
            FleetSize::OverFifty => "50+",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.label().eq_ignore_ascii_case(value))
    }
}

/// Services and fleet descriptors captured at intake and refined at induction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetClassification {
    pub contact_type: Option<ContactType>,
    pub services_provided: Vec<String>,
    pub vehicle_types_in_fleet: Vec<String>,
    pub fleet_size: Option<FleetSize>,
}

/// Licence and insurance particulars collected on the induction form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplianceDetails {
    pub license_number: Option<String>,
    pub license_expiry: Option<NaiveDate>,
    pub motor_insurance_policy_number: Option<String>,
    pub motor_insurance_expiry: Option<NaiveDate>,
    pub public_liability_policy_number: Option<String>,
    pub public_liability_expiry: Option<NaiveDate>,
    pub marine_cargo_policy_number: Option<String>,
    pub marine_cargo_expiry: Option<NaiveDate>,
    pub workers_comp_policy_number: Option<String>,
    pub workers_comp_expiry: Option<NaiveDate>,
}

impl ComplianceDetails {
    pub fn merge(&mut self, update: &ComplianceDetails) {
        merge_field(&mut self.license_number, &update.license_number);
        merge_field(&mut self.license_expiry, &update.license_expiry);
        merge_field(
            &mut self.motor_insurance_policy_number,
            &update.motor_insurance_policy_number,
        );
        merge_field(&mut self.motor_insurance_expiry, &update.motor_insurance_expiry);
        merge_field(
            &mut self.public_liability_policy_number,
            &update.public_liability_policy_number,
        );
        merge_field(&mut self.public_liability_expiry, &update.public_liability_expiry);
        merge_field(
            &mut self.marine_cargo_policy_number,
            &update.marine_cargo_policy_number,
        );
        merge_field(&mut self.marine_cargo_expiry, &update.marine_cargo_expiry);
        merge_field(
            &mut self.workers_comp_policy_number,
            &update.workers_comp_policy_number,
        );
        merge_field(&mut self.workers_comp_expiry, &update.workers_comp_expiry);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankingDetails {
    pub account_name: String,
    pub bsb: String,
    pub account_number: String,
}

/// Driver business record.
///
/// `driver_status` and `is_active` are private so the pair can only move together
/// through [`DriverProfile::transition_to`]: the profile is active exactly when it is
/// `COMPLIANT`.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverProfile {
    pub id: DriverId,
    pub driver_code: DriverCode,
    pub identity_id: Option<IdentityId>,
    pub contact_id: ContactId,
    pub email: String,
    driver_status: DriverStatus,
    pub compliance_status: ComplianceStatus,
    is_active: bool,
    pub classification: FleetClassification,
    pub compliance: ComplianceDetails,
    pub banking: Option<BankingDetails>,
    pub document_ids: Vec<DocumentId>,
    pub induction_submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<IdentityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DriverProfile {
    pub fn recruit(
        driver_code: DriverCode,
        identity_id: &IdentityId,
        contact: &Contact,
        status: DriverStatus,
        classification: FleetClassification,
        now: DateTime<Utc>,
    ) -> Self {
        let mut profile = Self {
            id: DriverId::generate(),
            driver_code,
            identity_id: Some(identity_id.clone()),
            contact_id: contact.id.clone(),
            email: contact.email.clone(),
            driver_status: DriverStatus::PendingRecruit,
            compliance_status: ComplianceStatus::NotSubmitted,
            is_active: false,
            classification,
            compliance: ComplianceDetails::default(),
            banking: None,
            document_ids: Vec::new(),
            induction_submitted_at: None,
            approved_at: None,
            approved_by: None,
            created_at: now,
            updated_at: now,
        };
        profile.transition_to(status);
        profile
    }

    pub fn driver_status(&self) -> DriverStatus {
        self.driver_status
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Move to `status`; activation follows the status.
    pub fn transition_to(&mut self, status: DriverStatus) {
        self.driver_status = status;
        self.is_active = status == DriverStatus::Compliant;
    }

    pub fn is_approved_driver(&self) -> bool {
        self.driver_status == DriverStatus::Compliant && self.is_active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    PendingInduction,
    Completed,
}

/// Append-style snapshot of a public intake submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub email: String,
    pub driver_id: DriverId,
    pub submission: Value,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Single-use induction credential. Only the SHA-256 digest of the secret is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InductionToken {
    pub token_hash: String,
    pub email: String,
    pub application_id: ApplicationId,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InductionToken {
    pub fn is_redeemable(&self, email: &str, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now && self.email == email
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    LicenseFront,
    LicenseBack,
    MotorInsurance,
    PublicLiability,
    MarineCargoInsurance,
    WorkersComp,
    PoliceCheck,
}

impl DocumentType {
    pub const ALL: [DocumentType; 7] = [
        DocumentType::LicenseFront,
        DocumentType::LicenseBack,
        DocumentType::MotorInsurance,
        DocumentType::PublicLiability,
        DocumentType::MarineCargoInsurance,
        DocumentType::WorkersComp,
        DocumentType::PoliceCheck,
    ];

    pub const fn slug(self) -> &'static str {
        match self {
            DocumentType::LicenseFront => "license_front",
            DocumentType::LicenseBack => "license_back",
            DocumentType::MotorInsurance => "motor_insurance",
            DocumentType::PublicLiability => "public_liability",
            DocumentType::MarineCargoInsurance => "marine_cargo_insurance",
            DocumentType::WorkersComp => "workers_comp",
            DocumentType::PoliceCheck => "police_check",
        }
    }

    /// Accepts `license_front`, `licenseFront` and `LICENSE_FRONT` alike.
    pub fn parse(value: &str) -> Option<Self> {
        let wanted: String = value
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.slug().replace('_', "") == wanted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentReviewStatus {
    Pending,
    Approved,
    Rejected,
}

/// Uploaded compliance file attached to a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceDocument {
    pub id: DocumentId,
    pub driver_id: DriverId,
    pub document_type: DocumentType,
    pub storage_url: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub review_status: DocumentReviewStatus,
    pub uploaded_at: DateTime<Utc>,
}
