use std::sync::Arc;

use chrono::Duration;

use super::common::*;

use crate::workflows::onboarding::credentials::{token_digest, verify_password, SecretInput};
use crate::workflows::onboarding::documents::DocumentOutcomeStatus;
use crate::workflows::onboarding::domain::{
    ApplicationStatus, ComplianceStatus, DriverStatus, Identity,
};
use crate::workflows::onboarding::payloads::{DocumentUpload, InductionAccess};
use crate::workflows::onboarding::policy::Clock;
use crate::workflows::onboarding::repository::{
    ApplicationStore, ComplianceDocumentStore, ContactStore, DriverProfileStore, IdentityStore,
    InductionTokenStore,
};
use crate::workflows::onboarding::{DriverOnboardingService, OnboardingError};

#[tokio::test]
async fn token_submission_moves_driver_to_review() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (driver_id, token) = shortlisted(&harness, "jo@fleet.test", &staff).await;

    let mut submission = induction("jo@fleet.test", Some(&token));
    submission.documents = vec![pdf_upload("license_front"), pdf_upload("motorInsurance")];
    let result = harness
        .service
        .submit_induction_form(submission, InductionAccess::Token(token.clone()))
        .await
        .expect("induction accepted");

    assert_eq!(result.driver.driver_status, DriverStatus::PendingInduction);
    assert_eq!(result.driver.compliance_status, ComplianceStatus::PendingReview);
    assert!(!result.driver.is_active);
    assert_eq!(result.driver.induction_submitted_at, Some(harness.clock.now()));
    assert_eq!(result.documents.len(), 2);
    assert!(result.documents.iter().all(|outcome| outcome.is_stored()));

    let driver = harness
        .store
        .find_driver(&driver_id)
        .await
        .expect("store ok")
        .expect("driver");
    assert_eq!(driver.compliance.license_number.as_deref(), Some("NSW1234567"));
    assert_eq!(
        driver.banking.as_ref().map(|banking| banking.bsb.as_str()),
        Some("062000")
    );
    assert_eq!(driver.document_ids.len(), 2);

    let contact = harness
        .store
        .find_contact(&driver.contact_id)
        .await
        .expect("store ok")
        .expect("contact");
    assert_eq!(contact.tax_id.as_deref(), Some("51824753556"));
    assert_eq!(contact.address.as_deref(), Some("1 Depot Rd"));
    assert_eq!(contact.first_name, "A");

    let submissions = harness.mailer.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].to, "jo@fleet.test");
    assert_eq!(submissions[0].first_name, "A");
    assert_eq!(submissions[0].driver_code.0, "DRV-000001");

    let token_record = harness
        .store
        .find_token(&token_digest(&token))
        .await
        .expect("store ok")
        .expect("token");
    assert!(token_record.used);
    assert_eq!(token_record.used_at, Some(harness.clock.now()));

    let application = harness
        .store
        .find_application(&token_record.application_id)
        .await
        .expect("store ok")
        .expect("application");
    assert_eq!(application.status, ApplicationStatus::Completed);

    let documents = harness
        .store
        .documents_for_driver(&driver_id)
        .await
        .expect("store ok");
    assert_eq!(documents.len(), 2);
    assert!(harness
        .documents
        .keys()
        .iter()
        .all(|key| key.starts_with("drivers/DRV-000001/")));
}

#[tokio::test]
async fn replayed_token_is_rejected_without_side_effects() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (driver_id, token) = shortlisted(&harness, "jo@fleet.test", &staff).await;
    harness
        .service
        .submit_induction_form(
            induction("jo@fleet.test", Some(&token)),
            InductionAccess::Token(token.clone()),
        )
        .await
        .expect("first submission accepted");
    let before = harness
        .store
        .find_driver(&driver_id)
        .await
        .expect("store ok")
        .expect("driver");

    let mut replay = induction("jo@fleet.test", Some(&token));
    replay.license_number = Some("CHANGED".to_string());
    let err = harness
        .service
        .submit_induction_form(replay, InductionAccess::Token(token))
        .await
        .unwrap_err();

    assert!(matches!(err, OnboardingError::InvalidToken));
    assert_eq!(err.to_string(), "Invalid or expired token.");
    let after = harness
        .store
        .find_driver(&driver_id)
        .await
        .expect("store ok")
        .expect("driver");
    assert_eq!(before, after);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (_, token) = shortlisted(&harness, "late@fleet.test", &staff).await;
    harness.clock.advance(Duration::days(8));

    let err = harness
        .service
        .submit_induction_form(
            induction("late@fleet.test", Some(&token)),
            InductionAccess::Token(token.clone()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OnboardingError::InvalidToken));
    let record = harness
        .store
        .find_token(&token_digest(&token))
        .await
        .expect("store ok")
        .expect("token");
    assert!(!record.used);
}

#[tokio::test]
async fn token_bound_to_another_email_is_rejected() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (_, token) = shortlisted(&harness, "owner@fleet.test", &staff).await;
    shortlisted(&harness, "other@fleet.test", &staff).await;

    let err = harness
        .service
        .submit_induction_form(
            induction("other@fleet.test", Some(&token)),
            InductionAccess::Token(token),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OnboardingError::InvalidToken));
}

#[tokio::test]
async fn validate_token_does_not_consume_it() {
    let harness = harness();
    let (receipt, token) = apply(&harness, "peek@fleet.test").await;

    let check = harness
        .service
        .validate_induction_token(&token, "Peek@Fleet.test")
        .await
        .expect("valid token");
    assert!(check.valid);
    assert_eq!(check.application_id, receipt.application_id);

    let again = harness
        .service
        .validate_induction_token(&token, "peek@fleet.test")
        .await;
    assert!(again.is_ok());

    let wrong = harness
        .service
        .validate_induction_token("deadbeef", "peek@fleet.test")
        .await;
    assert!(matches!(wrong, Err(OnboardingError::InvalidToken)));
}

#[tokio::test]
async fn pending_recruit_cannot_submit_induction() {
    let harness = harness();
    let (_, token) = apply(&harness, "early@fleet.test").await;

    let err = harness
        .service
        .submit_induction_form(
            induction("early@fleet.test", Some(&token)),
            InductionAccess::Token(token.clone()),
        )
        .await
        .unwrap_err();

    match &err {
        OnboardingError::StateConflict { actual, .. } => {
            assert_eq!(*actual, DriverStatus::PendingRecruit)
        }
        other => panic!("expected state conflict, got {other:?}"),
    }
    assert!(err.to_string().contains("PENDING_RECRUIT"));
    let record = harness
        .store
        .find_token(&token_digest(&token))
        .await
        .expect("store ok")
        .expect("token");
    assert!(!record.used, "a refused submission must leave the link usable");
}

#[tokio::test]
async fn concurrent_submissions_with_one_token_apply_once() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (_, token) = shortlisted(&harness, "twice@fleet.test", &staff).await;

    let (left, right) = tokio::join!(
        harness.service.submit_induction_form(
            induction("twice@fleet.test", Some(&token)),
            InductionAccess::Token(token.clone()),
        ),
        harness.service.submit_induction_form(
            induction("twice@fleet.test", Some(&token)),
            InductionAccess::Token(token.clone()),
        ),
    );

    let successes = [left.is_ok(), right.is_ok()]
        .into_iter()
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);
    assert!(matches!(
        left.err().or(right.err()),
        Some(OnboardingError::InvalidToken)
    ));
}

#[tokio::test]
async fn signed_in_driver_can_submit_without_token() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (driver_id, _) = shortlisted(&harness, "member@fleet.test", &staff).await;
    let identity = harness
        .store
        .find_identity_by_email("member@fleet.test")
        .await
        .expect("store ok")
        .expect("identity");

    let result = harness
        .service
        .submit_induction_form(
            induction("member@fleet.test", None),
            InductionAccess::Authenticated(identity.id.clone()),
        )
        .await
        .expect("induction accepted");

    assert_eq!(result.driver.id, driver_id);
    assert_eq!(result.driver.driver_status, DriverStatus::PendingInduction);
    let pending = harness
        .store
        .latest_pending_application(&driver_id)
        .await
        .expect("store ok");
    assert!(pending.is_none(), "open application is completed");
}

#[tokio::test]
async fn password_is_only_set_when_none_exists() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (_, token) = shortlisted(&harness, "pw@fleet.test", &staff).await;
    let original: Identity = harness
        .store
        .find_identity_by_email("pw@fleet.test")
        .await
        .expect("store ok")
        .expect("identity");

    let mut submission = induction("pw@fleet.test", Some(&token));
    submission.password = Some(SecretInput::new("chosen-password"));
    harness
        .service
        .submit_induction_form(submission, InductionAccess::Token(token))
        .await
        .expect("accepted");

    let kept = harness
        .store
        .find_identity(&original.id)
        .await
        .expect("store ok")
        .expect("identity");
    assert_eq!(kept.password_hash, original.password_hash);

    let mut cleared = kept;
    cleared.password_hash = None;
    harness.store.update_identity(cleared).await.expect("updated");
    let mut resubmission = induction("pw@fleet.test", None);
    resubmission.password = Some(SecretInput::new("chosen-password"));
    harness
        .service
        .submit_induction_form(resubmission, InductionAccess::Authenticated(original.id.clone()))
        .await
        .expect("accepted");

    let updated = harness
        .store
        .find_identity(&original.id)
        .await
        .expect("store ok")
        .expect("identity");
    let hash = updated.password_hash.expect("password set");
    assert!(verify_password("chosen-password", &hash).expect("verifies"));
}

#[tokio::test]
async fn taken_username_fails_validation() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (_, token) = shortlisted(&harness, "new@fleet.test", &staff).await;

    let mut submission = induction("new@fleet.test", Some(&token));
    submission.username = Some("ops".to_string());
    let err = harness
        .service
        .submit_induction_form(submission, InductionAccess::Token(token))
        .await
        .unwrap_err();

    match err {
        OnboardingError::Validation(errors) => assert!(errors.contains("username")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn email_shaped_username_is_refused_and_cannot_block_intake() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (_, token) = shortlisted(&harness, "first@fleet.test", &staff).await;

    let mut submission = induction("first@fleet.test", Some(&token));
    submission.username = Some("victim@fleet.test".to_string());
    let err = harness
        .service
        .submit_induction_form(submission, InductionAccess::Token(token.clone()))
        .await
        .unwrap_err();
    match err {
        OnboardingError::Validation(errors) => assert!(errors.contains("username")),
        other => panic!("expected validation error, got {other:?}"),
    }

    let (receipt, _) = apply(&harness, "victim@fleet.test").await;
    assert_eq!(receipt.email, "victim@fleet.test");
    let stored = harness
        .store
        .find_token(&token_digest(&token))
        .await
        .expect("store ok")
        .expect("token");
    assert!(!stored.used);
}

#[tokio::test]
async fn bad_documents_are_reported_without_failing_the_form() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (driver_id, token) = shortlisted(&harness, "docs@fleet.test", &staff).await;

    let mut submission = induction("docs@fleet.test", Some(&token));
    submission.documents = vec![
        pdf_upload("police_check"),
        DocumentUpload {
            mime_type: "text/plain".to_string(),
            file_name: "notes.txt".to_string(),
            ..pdf_upload("license_back")
        },
        DocumentUpload {
            content_base64: "A".repeat(MAX_DOCUMENT_BYTES * 2),
            ..pdf_upload("public_liability")
        },
    ];

    let result = harness
        .service
        .submit_induction_form(submission, InductionAccess::Token(token))
        .await
        .expect("form accepted");

    let statuses: Vec<_> = result
        .documents
        .iter()
        .map(|outcome| outcome.status.clone())
        .collect();
    assert_eq!(
        statuses,
        vec![
            DocumentOutcomeStatus::Stored,
            DocumentOutcomeStatus::Rejected,
            DocumentOutcomeStatus::Rejected,
        ]
    );
    assert_eq!(result.driver.driver_status, DriverStatus::PendingInduction);
    let stored = harness
        .store
        .documents_for_driver(&driver_id)
        .await
        .expect("store ok");
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn storage_outage_marks_documents_failed() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (_, token) = shortlisted(&harness, "outage@fleet.test", &staff).await;
    harness.documents.fail_all();

    let mut submission = induction("outage@fleet.test", Some(&token));
    submission.documents = vec![pdf_upload("license_front")];
    let result = harness
        .service
        .submit_induction_form(submission, InductionAccess::Token(token))
        .await
        .expect("form accepted");

    assert_eq!(result.documents[0].status, DocumentOutcomeStatus::Failed);
    assert!(result.documents[0]
        .reason
        .as_deref()
        .is_some_and(|reason| reason.contains("bucket offline")));
}

#[tokio::test]
async fn invalid_form_leaves_token_unused() {
    let harness = harness();
    let staff = seed_staff(&harness).await;
    let (_, token) = shortlisted(&harness, "typo@fleet.test", &staff).await;

    let mut submission = induction("typo@fleet.test", Some(&token));
    submission.bank_bsb = Some("12345".to_string());
    let err = harness
        .service
        .submit_induction_form(submission, InductionAccess::Token(token.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, OnboardingError::Validation(_)));
    assert!(harness
        .service
        .validate_induction_token(&token, "typo@fleet.test")
        .await
        .is_ok());
}

async fn failed_identity_write_keeps_link_redeemable(failure: IdentityWriteFailure) {
    let store = Arc::new(FlakyStore::default());
    let mailer = Arc::new(RecordingMailer::default());
    let service = DriverOnboardingService::new(
        store.clone(),
        Arc::new(MemoryDocuments::default()),
        mailer.clone(),
        policy(),
    );
    let staff = store
        .insert_identity(Identity::staff("ops@fleet.test", "ops", chrono::Utc::now()))
        .await
        .expect("staff seeded")
        .id;
    let receipt = service
        .submit_application(application("retry@fleet.test"))
        .await
        .expect("application accepted");
    service
        .shortlist_recruit(&receipt.driver.id, &staff)
        .await
        .expect("shortlisted");
    let token = mailer
        .latest_token_for("retry@fleet.test")
        .expect("induction link emailed");

    store.fail_identity_writes(Some(failure));
    let err = service
        .submit_induction_form(
            induction("retry@fleet.test", Some(&token)),
            InductionAccess::Token(token.clone()),
        )
        .await
        .unwrap_err();
    match (failure, err) {
        (IdentityWriteFailure::Conflict, OnboardingError::Validation(errors)) => {
            assert!(errors.contains("username"))
        }
        (IdentityWriteFailure::Unavailable, OnboardingError::Store(_)) => {}
        (_, other) => panic!("unexpected error {other:?}"),
    }

    let stored = store
        .find_token(&token_digest(&token))
        .await
        .expect("store ok")
        .expect("token");
    assert!(!stored.used);
    assert!(stored.used_at.is_none());
    assert!(service
        .validate_induction_token(&token, "retry@fleet.test")
        .await
        .is_ok());
    let driver = store
        .find_driver(&receipt.driver.id)
        .await
        .expect("store ok")
        .expect("driver");
    assert_eq!(driver.driver_status(), DriverStatus::NewRecruit);

    store.fail_identity_writes(None);
    let result = service
        .submit_induction_form(
            induction("retry@fleet.test", Some(&token)),
            InductionAccess::Token(token.clone()),
        )
        .await
        .expect("retry accepted");
    assert_eq!(result.driver.driver_status, DriverStatus::PendingInduction);
}

#[tokio::test]
async fn store_outage_during_induction_releases_the_link() {
    failed_identity_write_keeps_link_redeemable(IdentityWriteFailure::Unavailable).await;
}

#[tokio::test]
async fn username_race_during_induction_releases_the_link() {
    failed_identity_write_keeps_link_redeemable(IdentityWriteFailure::Conflict).await;
}
