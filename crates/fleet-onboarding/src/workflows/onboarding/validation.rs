//! Field-level validation of the intake and induction forms.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::credentials::SecretInput;
use super::domain::{
    BankingDetails, ComplianceDetails, ContactDetails, ContactType, DriverStatus,
    FleetClassification, FleetSize,
};
use super::payloads::{ApplicationSubmission, DocumentUpload, InductionSubmission};

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+$")
        .expect("compile email regex")
});

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*[A-Za-z0-9]$").expect("compile username regex")
});

const EMAIL_MAX: usize = 254;
const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;
const ABN_DIGITS: usize = 11;
const BSB_DIGITS: usize = 6;
const ACCOUNT_NUMBER_DIGITS: std::ops::RangeInclusive<usize> = 5..=10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Accumulated field errors; a form reports every problem at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= EMAIL_MAX && EMAIL_REGEX.is_match(email)
}

pub fn is_valid_username(username: &str) -> bool {
    (USERNAME_MIN..=USERNAME_MAX).contains(&username.len()) && USERNAME_REGEX.is_match(username)
}

pub fn is_valid_password(password: &str) -> bool {
    (PASSWORD_MIN..=PASSWORD_MAX).contains(&password.chars().count())
}

/// Strips the spaces people type into ABNs and BSBs (`12 345 678 901`, `062-000`).
fn digits_only(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    (!cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit())).then_some(cleaned)
}

/// Classification lists arrive either as JSON arrays or as strings holding one.
pub fn parse_string_list(value: &Value) -> Result<Vec<String>, &'static str> {
    let parsed;
    let items = match value {
        Value::Array(items) => items,
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw).map_err(|_| "must be a JSON array")?;
            match &parsed {
                Value::Array(items) => items,
                _ => return Err("must be a JSON array"),
            }
        }
        _ => return Err("must be a JSON array"),
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err("must contain only non-empty strings"),
        })
        .collect()
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required(errors: &mut ValidationErrors, field: &str, value: &Option<String>) -> String {
    match trimmed(value) {
        Some(value) => value,
        None => {
            errors.push(field, "is required");
            String::new()
        }
    }
}

fn optional_list(
    errors: &mut ValidationErrors,
    field: &str,
    value: &Option<Value>,
) -> Option<Vec<String>> {
    let value = value.as_ref().filter(|value| !value.is_null())?;
    match parse_string_list(value) {
        Ok(items) => Some(items),
        Err(message) => {
            errors.push(field, message);
            None
        }
    }
}

fn optional_date(
    errors: &mut ValidationErrors,
    field: &str,
    value: &Option<String>,
) -> Option<NaiveDate> {
    let raw = trimmed(value)?;
    match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(field, "must be a date formatted YYYY-MM-DD");
            None
        }
    }
}

/// Intake form after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedApplication {
    pub email: String,
    pub contact: ContactDetails,
    pub classification: FleetClassification,
    pub starting_status: DriverStatus,
}

pub fn validate_application(
    submission: &ApplicationSubmission,
) -> Result<ValidatedApplication, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let email = normalize_email(&required(&mut errors, "email", &submission.email));
    if !email.is_empty() && !is_valid_email(&email) {
        errors.push("email", "must be a valid email address");
    }

    let first_name = required(&mut errors, "firstName", &submission.first_name);
    let last_name = required(&mut errors, "lastName", &submission.last_name);
    let phone = required(&mut errors, "phone", &submission.phone);
    let suburb = required(&mut errors, "suburb", &submission.suburb);
    let state_region = required(&mut errors, "stateRegion", &submission.state_region);

    let contact_type = match trimmed(&submission.contact_type) {
        Some(raw) => match ContactType::parse(&raw) {
            Some(contact_type) => Some(contact_type),
            None => {
                errors.push(
                    "contactType",
                    "must be one of Owner Operator, Fleet Operator, Subcontractor",
                );
                None
            }
        },
        None => {
            errors.push("contactType", "is required");
            None
        }
    };

    let services_provided =
        match optional_list(&mut errors, "servicesProvided", &submission.services_provided) {
            Some(services) if services.is_empty() => {
                errors.push("servicesProvided", "must list at least one service");
                Vec::new()
            }
            Some(services) => services,
            None if submission
                .services_provided
                .as_ref()
                .map_or(true, Value::is_null) =>
            {
                errors.push("servicesProvided", "is required");
                Vec::new()
            }
            None => Vec::new(),
        };

    let vehicle_types_in_fleet = optional_list(
        &mut errors,
        "vehicleTypesInFleet",
        &submission.vehicle_types_in_fleet,
    )
    .unwrap_or_default();

    let fleet_size = trimmed(&submission.fleet_size).and_then(|raw| {
        let parsed = FleetSize::parse(&raw);
        if parsed.is_none() {
            errors.push(
                "fleetSize",
                "must be one of 1 to 5, 6 to 10, 11 to 20, 21 to 50, 50+",
            );
        }
        parsed
    });

    let starting_status = match trimmed(&submission.driver_status) {
        None => DriverStatus::PendingRecruit,
        Some(raw) => match DriverStatus::parse(&raw) {
            Some(status @ (DriverStatus::PendingRecruit | DriverStatus::NewRecruit)) => status,
            _ => {
                errors.push("driverStatus", "must be PENDING_RECRUIT or NEW_RECRUIT");
                DriverStatus::PendingRecruit
            }
        },
    };

    errors.into_result(|| ValidatedApplication {
        email,
        contact: ContactDetails {
            first_name: Some(first_name),
            last_name: Some(last_name),
            phone: Some(phone),
            suburb: Some(suburb),
            state_region: Some(state_region),
            postcode: trimmed(&submission.postcode),
            company_name: trimmed(&submission.company_name),
            ..ContactDetails::default()
        },
        classification: FleetClassification {
            contact_type,
            services_provided,
            vehicle_types_in_fleet,
            fleet_size,
        },
        starting_status,
    })
}

/// Induction form after validation. Absent optional fields leave stored values untouched.
#[derive(Debug, Clone)]
pub struct ValidatedInduction {
    pub username: Option<String>,
    pub password: Option<SecretInput>,
    pub contact: ContactDetails,
    pub banking: Option<BankingDetails>,
    pub compliance: ComplianceDetails,
    pub services_provided: Option<Vec<String>>,
    pub vehicle_types_in_fleet: Option<Vec<String>>,
    pub documents: Vec<DocumentUpload>,
}

pub fn validate_induction(
    submission: &InductionSubmission,
) -> Result<ValidatedInduction, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let username = trimmed(&submission.username);
    if let Some(username) = &username {
        if !is_valid_username(username) {
            errors.push(
                "username",
                "must be 3-30 characters of letters, digits, '.', '_' or '-'",
            );
        }
    }

    let password = submission
        .password
        .as_ref()
        .filter(|password| !password.expose().is_empty())
        .cloned();
    if let Some(password) = &password {
        if !is_valid_password(password.expose()) {
            errors.push("password", "must be between 8 and 128 characters");
        }
    }

    let tax_id = trimmed(&submission.abn).and_then(|raw| match digits_only(&raw) {
        Some(digits) if digits.len() == ABN_DIGITS => Some(digits),
        _ => {
            errors.push("abn", "must contain exactly 11 digits");
            None
        }
    });

    let banking = validate_banking(&mut errors, submission);

    let compliance = ComplianceDetails {
        license_number: trimmed(&submission.license_number),
        license_expiry: optional_date(&mut errors, "licenseExpiry", &submission.license_expiry),
        motor_insurance_policy_number: trimmed(&submission.motor_insurance_policy_number),
        motor_insurance_expiry: optional_date(
            &mut errors,
            "motorInsuranceExpiry",
            &submission.motor_insurance_expiry,
        ),
        public_liability_policy_number: trimmed(&submission.public_liability_policy_number),
        public_liability_expiry: optional_date(
            &mut errors,
            "publicLiabilityExpiry",
            &submission.public_liability_expiry,
        ),
        marine_cargo_policy_number: trimmed(&submission.marine_cargo_policy_number),
        marine_cargo_expiry: optional_date(
            &mut errors,
            "marineCargoExpiry",
            &submission.marine_cargo_expiry,
        ),
        workers_comp_policy_number: trimmed(&submission.workers_comp_policy_number),
        workers_comp_expiry: optional_date(
            &mut errors,
            "workersCompExpiry",
            &submission.workers_comp_expiry,
        ),
    };

    let services_provided =
        optional_list(&mut errors, "servicesProvided", &submission.services_provided);
    let vehicle_types_in_fleet = optional_list(
        &mut errors,
        "vehicleTypesInFleet",
        &submission.vehicle_types_in_fleet,
    );

    errors.into_result(|| ValidatedInduction {
        username,
        password,
        contact: ContactDetails {
            first_name: trimmed(&submission.first_name),
            last_name: trimmed(&submission.last_name),
            phone: trimmed(&submission.phone),
            address: trimmed(&submission.address),
            suburb: trimmed(&submission.suburb),
            state_region: trimmed(&submission.state_region),
            postcode: trimmed(&submission.postcode),
            company_name: trimmed(&submission.company_name),
            tax_id,
        },
        banking,
        compliance,
        services_provided,
        vehicle_types_in_fleet,
        documents: submission.documents.clone(),
    })
}

fn validate_banking(
    errors: &mut ValidationErrors,
    submission: &InductionSubmission,
) -> Option<BankingDetails> {
    let account_name = trimmed(&submission.bank_account_name);
    let bsb = trimmed(&submission.bank_bsb);
    let account_number = trimmed(&submission.bank_account_number);

    if account_name.is_none() && bsb.is_none() && account_number.is_none() {
        return None;
    }

    let before = errors.fields().len();
    if account_name.is_none() {
        errors.push("bankAccountName", "is required when banking details are supplied");
    }

    let bsb = match bsb.as_deref().map(digits_only) {
        Some(Some(digits)) if digits.len() == BSB_DIGITS => Some(digits),
        Some(_) => {
            errors.push("bankBsb", "must contain exactly 6 digits");
            None
        }
        None => {
            errors.push("bankBsb", "is required when banking details are supplied");
            None
        }
    };

    let account_number = match account_number {
        Some(raw)
            if raw.chars().all(|c| c.is_ascii_digit())
                && ACCOUNT_NUMBER_DIGITS.contains(&raw.len()) =>
        {
            Some(raw)
        }
        Some(_) => {
            errors.push("bankAccountNumber", "must be 5-10 digits");
            None
        }
        None => {
            errors.push(
                "bankAccountNumber",
                "is required when banking details are supplied",
            );
            None
        }
    };

    if errors.fields().len() != before {
        return None;
    }

    Some(BankingDetails {
        account_name: account_name.unwrap_or_default(),
        bsb: bsb.unwrap_or_default(),
        account_number: account_number.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn application() -> ApplicationSubmission {
        ApplicationSubmission {
            email: Some(" A@B.com ".to_string()),
            first_name: Some("A".to_string()),
            last_name: Some("B".to_string()),
            phone: Some("0400000000".to_string()),
            suburb: Some("X".to_string()),
            state_region: Some("NSW".to_string()),
            contact_type: Some("Owner Operator".to_string()),
            services_provided: Some(json!(["Courier"])),
            vehicle_types_in_fleet: Some(json!(["Van"])),
            fleet_size: Some("1 to 5".to_string()),
            ..ApplicationSubmission::default()
        }
    }

    #[test]
    fn application_normalizes_email_and_defaults_status() {
        let form = validate_application(&application()).expect("valid");
        assert_eq!(form.email, "a@b.com");
        assert_eq!(form.starting_status, DriverStatus::PendingRecruit);
        assert_eq!(form.classification.fleet_size, Some(FleetSize::OneToFive));
        assert_eq!(form.classification.services_provided, vec!["Courier"]);
    }

    #[test]
    fn application_reports_every_missing_field() {
        let errors = validate_application(&ApplicationSubmission::default()).unwrap_err();
        for field in [
            "email",
            "firstName",
            "lastName",
            "phone",
            "suburb",
            "stateRegion",
            "contactType",
            "servicesProvided",
        ] {
            assert!(errors.contains(field), "missing error for {field}");
        }
    }

    #[test]
    fn application_rejects_compliant_starting_status() {
        let mut submission = application();
        submission.driver_status = Some("COMPLIANT".to_string());
        let errors = validate_application(&submission).unwrap_err();
        assert!(errors.contains("driverStatus"));

        submission.driver_status = Some("NEW_RECRUIT".to_string());
        let form = validate_application(&submission).expect("valid");
        assert_eq!(form.starting_status, DriverStatus::NewRecruit);
    }

    #[test]
    fn lists_accept_arrays_and_encoded_strings() {
        assert_eq!(
            parse_string_list(&json!("[\"Courier\",\"Freight\"]")).expect("parses"),
            vec!["Courier", "Freight"]
        );
        assert!(parse_string_list(&json!("Courier")).is_err());
        assert!(parse_string_list(&json!([1, 2])).is_err());
        assert!(parse_string_list(&json!({"a": 1})).is_err());
    }

    #[test]
    fn induction_checks_digit_counts() {
        let submission = InductionSubmission {
            abn: Some("12 345 678".to_string()),
            bank_account_name: Some("Jo Doe".to_string()),
            bank_bsb: Some("06200".to_string()),
            bank_account_number: Some("12ab56".to_string()),
            license_expiry: Some("31/12/2026".to_string()),
            ..InductionSubmission::default()
        };
        let errors = validate_induction(&submission).unwrap_err();
        assert!(errors.contains("abn"));
        assert!(errors.contains("bankBsb"));
        assert!(errors.contains("bankAccountNumber"));
        assert!(errors.contains("licenseExpiry"));
    }

    #[test]
    fn induction_accepts_formatted_numbers() {
        let submission = InductionSubmission {
            abn: Some("51 824 753 556".to_string()),
            bank_account_name: Some("Jo Doe".to_string()),
            bank_bsb: Some("062-000".to_string()),
            bank_account_number: Some("12345678".to_string()),
            license_expiry: Some("2027-03-31".to_string()),
            username: Some("jo.doe".to_string()),
            password: Some(SecretInput::new("longenough")),
            ..InductionSubmission::default()
        };
        let form = validate_induction(&submission).expect("valid");
        assert_eq!(form.contact.tax_id.as_deref(), Some("51824753556"));
        let banking = form.banking.expect("banking present");
        assert_eq!(banking.bsb, "062000");
        assert_eq!(
            form.compliance.license_expiry,
            NaiveDate::from_ymd_opt(2027, 3, 31)
        );
    }

    #[test]
    fn usernames_and_passwords_follow_length_rules() {
        assert!(is_valid_username("jo.doe"));
        assert!(!is_valid_username("jo@example.com"));
        assert!(!is_valid_username("jo"));
        assert!(!is_valid_username("trailing_"));
        assert!(!is_valid_password("short"));
        assert!(is_valid_password("exactly8"));
    }
}
