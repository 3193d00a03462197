use crate::infra::{seed_staff_identity, InMemoryDocumentStore, LoggingMailer, DEFAULT_STAFF_EMAIL};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::Args;
use fleet_onboarding::config::OnboardingConfig;
use fleet_onboarding::error::AppError;
use fleet_onboarding::workflows::onboarding::{
    ApplicationSubmission, DocumentUpload, DriverOnboardingService, InMemoryOnboardingStore,
    InductionAccess, InductionSubmission, OnboardingError, OnboardingPolicy,
};
use serde_json::json;
use std::sync::Arc;
use url::Url;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Applicant email used for the walkthrough
    #[arg(long, default_value = "demo.driver@fleet.local")]
    pub(crate) email: String,
    /// Stop once the induction form is submitted, leaving the driver in the review queue
    #[arg(long)]
    pub(crate) skip_approval: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        email,
        skip_approval,
    } = args;

    let policy = OnboardingPolicy::from_config(&OnboardingConfig::default())?;
    let store = Arc::new(InMemoryOnboardingStore::new());
    let mailer = Arc::new(LoggingMailer::with_outbox());
    let documents = Arc::new(InMemoryDocumentStore::default());
    let staff = seed_staff_identity(&store, DEFAULT_STAFF_EMAIL).await?;
    let service = DriverOnboardingService::new(store, documents.clone(), mailer.clone(), policy);

    println!("Driver onboarding walkthrough");

    let receipt = report(
        "Application",
        service
            .submit_application(demo_application(&email))
            .await,
    )?;
    println!(
        "  driver {} created as {}",
        receipt.driver.driver_code, receipt.driver.driver_status
    );

    let shortlisted = report(
        "Shortlist",
        service.shortlist_recruit(&receipt.driver.id, &staff).await,
    )?;
    println!("  driver status is now {}", shortlisted.driver_status);

    let Some(token) = mailer
        .latest_link_for(&receipt.email)
        .as_deref()
        .and_then(token_from_link)
    else {
        println!("No induction link was issued; stopping.");
        return Ok(());
    };

    let check = report(
        "Token check",
        service.validate_induction_token(&token, &receipt.email).await,
    )?;
    println!("  link valid until {}", check.expires_at.format("%Y-%m-%d %H:%M"));

    let induction = report(
        "Induction",
        service
            .submit_induction_form(
                demo_induction(&receipt.email, &token),
                InductionAccess::Token(token.clone()),
            )
            .await,
    )?;
    let stored = induction
        .documents
        .iter()
        .filter(|outcome| outcome.is_stored())
        .count();
    println!(
        "  {} ({} of {} documents stored, bucket holds {})",
        induction.driver.driver_status,
        stored,
        induction.documents.len(),
        documents.len()
    );

    let queue = report(
        "Review queue",
        service.pending_inductions(&staff, 10).await,
    )?;
    for driver in &queue {
        println!("  - {} {}", driver.driver_code, driver.email);
    }

    if skip_approval {
        println!("\nApproval skipped; driver left at {}", induction.driver.driver_status);
        return Ok(());
    }

    let approval = report(
        "Approval",
        service.approve_induction(&receipt.driver.id, &staff).await,
    )?;
    println!(
        "  {} is {} (account {}, active: {})",
        approval.user.username,
        approval.driver.driver_status,
        approval.user.status,
        approval.driver.is_active
    );

    let repair = report(
        "Link check",
        service.sync_identity_link(&approval.user.id).await,
    )?;
    println!("  {}", repair.message);

    Ok(())
}

fn report<T>(step: &str, result: Result<T, OnboardingError>) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            println!("\n{step}: ok");
            Ok(value)
        }
        Err(err) => {
            println!("\n{step}: failed ({} {})", err.code(), err);
            Err(err.into())
        }
    }
}

fn token_from_link(link: &str) -> Option<String> {
    Url::parse(link)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

fn demo_application(email: &str) -> ApplicationSubmission {
    ApplicationSubmission {
        email: Some(email.to_string()),
        first_name: Some("Dana".to_string()),
        last_name: Some("Hauler".to_string()),
        phone: Some("0400 123 456".to_string()),
        suburb: Some("Parramatta".to_string()),
        state_region: Some("NSW".to_string()),
        postcode: Some("2150".to_string()),
        contact_type: Some("Owner Operator".to_string()),
        services_provided: Some(json!(["Courier", "Taxi Truck"])),
        vehicle_types_in_fleet: Some(json!(["Van"])),
        fleet_size: Some("1 to 5".to_string()),
        ..ApplicationSubmission::default()
    }
}

fn demo_induction(email: &str, token: &str) -> InductionSubmission {
    InductionSubmission {
        token: Some(token.to_string()),
        email: Some(email.to_string()),
        username: Some("dana.hauler".to_string()),
        address: Some("12 Depot Road".to_string()),
        abn: Some("51 824 753 556".to_string()),
        bank_account_name: Some("Dana Hauler".to_string()),
        bank_bsb: Some("062-000".to_string()),
        bank_account_number: Some("12345678".to_string()),
        license_number: Some("NSW7654321".to_string()),
        license_expiry: Some("2028-03-31".to_string()),
        documents: vec![DocumentUpload {
            document_type: "licenseFront".to_string(),
            file_name: "licence-front.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            content_base64: STANDARD.encode(b"%PDF-1.7 demo licence"),
        }],
        ..InductionSubmission::default()
    }
}
