use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use super::credentials::{hash_password, token_digest, InductionSecret};
use super::documents::{store_documents, DocumentOutcome};
use super::domain::{
    AccountStatus, ApplicationId, ApplicationRecord, ApplicationStatus, ApprovalStatus,
    ComplianceDocument, ComplianceStatus, Contact, DriverId, DriverProfile, DriverStatus,
    Identity, IdentityId, InductionToken,
};
use super::errors::OnboardingError;
use super::payloads::{
    ApplicationReceipt, ApplicationSubmission, ApprovalResult, DriverSummary, DriverView,
    IdentityView, InductionAccess, InductionLinkReceipt, InductionResult, InductionSubmission,
    LinkOutcome, LinkRepair, TokenCheck,
};
use super::policy::{Clock, OnboardingPolicy, SystemClock};
use super::reconcile::{already_compliant, Reconciler};
use super::repository::{
    ApplicationEmail, ApprovedEmail, DocumentStore, InductionSubmittedEmail, Mailer,
    OnboardingStore, StoreError,
};
use super::validation::{
    normalize_email, validate_application, validate_induction, ValidatedInduction,
    ValidationErrors,
};

/// Default page size for the staff review queue.
pub const DEFAULT_PENDING_LIMIT: usize = 50;

/// Service composing the stores, document storage and mailer into the onboarding workflow.
pub struct DriverOnboardingService<S, D, M> {
    store: Arc<S>,
    documents: Arc<D>,
    mailer: Arc<M>,
    policy: OnboardingPolicy,
    clock: Arc<dyn Clock>,
}

impl<S, D, M> DriverOnboardingService<S, D, M>
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    pub fn new(store: Arc<S>, documents: Arc<D>, mailer: Arc<M>, policy: OnboardingPolicy) -> Self {
        Self {
            store,
            documents,
            mailer,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &OnboardingPolicy {
        &self.policy
    }

    fn reconciler(&self, now: DateTime<Utc>) -> Reconciler<'_, S> {
        Reconciler::new(self.store.as_ref(), now)
    }

    /// Public intake: reconcile the records for the email, log the application and email
    /// a single-use induction link.
    #[instrument(skip_all)]
    pub async fn submit_application(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<ApplicationReceipt, OnboardingError> {
        let form = validate_application(&submission).map_err(OnboardingError::Validation)?;
        let now = self.clock.now();
        let reconciler = self.reconciler(now);

        let identity = reconciler.identity_for_email(&form.email).await?;
        let existing = reconciler.existing_driver(&identity.id, &form.email).await?;
        if existing
            .as_ref()
            .is_some_and(DriverProfile::is_approved_driver)
        {
            return Err(already_compliant(&form.email));
        }

        let contact = reconciler
            .contact_for_email(&form.email, &form.contact)
            .await?;
        let driver = reconciler
            .recruit(&identity, &contact, existing, &form)
            .await?;

        let application = self
            .store
            .insert_application(ApplicationRecord {
                id: ApplicationId::generate(),
                email: form.email.clone(),
                driver_id: driver.id.clone(),
                submission: serde_json::to_value(&submission).unwrap_or(Value::Null),
                status: ApplicationStatus::PendingInduction,
                submitted_at: now,
                completed_at: None,
            })
            .await?;

        let (raw_token, token) = self
            .issue_token(&form.email, &application.id, now)
            .await?;
        self.send_induction_link(&contact, &raw_token, &token).await;

        info!(
            driver_code = %driver.driver_code,
            application_id = %application.id,
            status = %driver.driver_status(),
            "application received"
        );

        Ok(ApplicationReceipt {
            application_id: application.id,
            email: form.email,
            driver: DriverSummary::from(&driver),
        })
    }

    /// Checks a link token without consuming it.
    pub async fn validate_induction_token(
        &self,
        raw_token: &str,
        email: &str,
    ) -> Result<TokenCheck, OnboardingError> {
        let email = normalize_email(email);
        let token = self.redeemable_token(raw_token, &email).await?;
        Ok(TokenCheck {
            valid: true,
            email: token.email,
            application_id: token.application_id,
            expires_at: token.expires_at,
        })
    }

    async fn redeemable_token(
        &self,
        raw_token: &str,
        email: &str,
    ) -> Result<InductionToken, OnboardingError> {
        if raw_token.trim().is_empty() || email.is_empty() {
            return Err(OnboardingError::InvalidToken);
        }
        let now = self.clock.now();
        self.store
            .find_token(&token_digest(raw_token))
            .await?
            .filter(|token| token.is_redeemable(email, now))
            .ok_or(OnboardingError::InvalidToken)
    }

    /// Induction form: merge compliance data, store documents and move the driver to
    /// `PENDING_INDUCTION` for staff review.
    #[instrument(skip_all)]
    pub async fn submit_induction_form(
        &self,
        submission: InductionSubmission,
        access: InductionAccess,
    ) -> Result<InductionResult, OnboardingError> {
        let token_claim = match &access {
            InductionAccess::Token(raw_token) => {
                let email = normalize_email(submission.email.as_deref().unwrap_or_default());
                self.redeemable_token(raw_token, &email).await?;
                Some((token_digest(raw_token), email))
            }
            InductionAccess::Authenticated(_) => None,
        };

        let form = validate_induction(&submission).map_err(OnboardingError::Validation)?;
        let now = self.clock.now();
        let reconciler = self.reconciler(now);

        let records = match (&access, &token_claim) {
            (InductionAccess::Authenticated(identity_id), _) => {
                reconciler.records_for_identity(identity_id).await?
            }
            (InductionAccess::Token(_), Some((_, email))) => {
                reconciler.records_for_email(email).await?
            }
            (InductionAccess::Token(_), None) => return Err(OnboardingError::InvalidToken),
        };
        let (identity, contact, driver) =
            (records.identity, records.contact, records.driver);

        let status = driver.driver_status();
        if !matches!(
            status,
            DriverStatus::NewRecruit | DriverStatus::PendingInduction
        ) {
            return Err(OnboardingError::StateConflict {
                action: "submit induction",
                expected: "NEW_RECRUIT or PENDING_INDUCTION",
                actual: status,
            });
        }

        if let Some(username) = &form.username {
            if !username.eq_ignore_ascii_case(&identity.username) {
                let taken = self.store.find_identity_by_username(username).await?;
                if taken.is_some_and(|other| other.id != identity.id) {
                    return Err(username_taken());
                }
            }
        }

        // Claim the token before any write so a replayed link cannot apply twice.
        let application_id = match &token_claim {
            Some((token_hash, email)) => {
                match self.store.consume_token(token_hash, email, now).await? {
                    Some(token) => Some(token.application_id),
                    None => return Err(OnboardingError::InvalidToken),
                }
            }
            None => self
                .store
                .latest_pending_application(&driver.id)
                .await?
                .map(|application| application.id),
        };

        let (contact, driver, outcomes) = match self
            .apply_induction(form, identity, contact, driver, now)
            .await
        {
            Ok(applied) => applied,
            Err(err) => {
                if let Some((token_hash, _)) = &token_claim {
                    self.release_token_claim(token_hash).await;
                }
                return Err(err);
            }
        };

        if let Some(application_id) = application_id {
            match self.store.complete_application(&application_id, now).await {
                Ok(Some(_)) => {}
                Ok(None) => warn!(%application_id, "application missing when completing induction"),
                Err(err) => warn!(%application_id, error = %err, "application not marked completed"),
            }
        }

        let notice = InductionSubmittedEmail {
            to: contact.email.clone(),
            first_name: contact.greeting_name().to_string(),
            driver_code: driver.driver_code.clone(),
        };
        if let Err(err) = self.mailer.send_induction_submitted_email(notice).await {
            warn!(driver_code = %driver.driver_code, error = %err, "induction confirmation email failed");
        }

        info!(
            driver_code = %driver.driver_code,
            documents_stored = outcomes.iter().filter(|outcome| outcome.is_stored()).count(),
            documents_skipped = outcomes.iter().filter(|outcome| !outcome.is_stored()).count(),
            "induction submitted"
        );

        Ok(InductionResult {
            driver: DriverView::from(&driver),
            documents: outcomes,
        })
    }

    /// Writes an accepted induction form. The caller owns the token claim.
    async fn apply_induction(
        &self,
        form: ValidatedInduction,
        mut identity: Identity,
        contact: Contact,
        mut driver: DriverProfile,
        now: DateTime<Utc>,
    ) -> Result<(Contact, DriverProfile, Vec<DocumentOutcome>), OnboardingError> {
        if let Some(username) = &form.username {
            identity.username = username.clone();
        }
        if identity.password_hash.is_none() {
            if let Some(password) = &form.password {
                identity.password_hash = Some(hash_password(password.expose())?);
                identity.must_change_password = false;
            }
        }
        identity.updated_at = now;
        let identity = match self.store.update_identity(identity).await {
            Ok(identity) => identity,
            Err(StoreError::Conflict) => return Err(username_taken()),
            Err(err) => return Err(err.into()),
        };

        let contact = self
            .reconciler(now)
            .merge_contact(contact, &form.contact)
            .await?;

        let outcomes = store_documents(
            self.store.as_ref(),
            self.documents.as_ref(),
            &self.policy.documents,
            &driver,
            &form.documents,
            now,
        )
        .await;

        driver.compliance.merge(&form.compliance);
        if let Some(banking) = form.banking {
            driver.banking = Some(banking);
        }
        if let Some(services) = form.services_provided {
            driver.classification.services_provided = services;
        }
        if let Some(vehicles) = form.vehicle_types_in_fleet {
            driver.classification.vehicle_types_in_fleet = vehicles;
        }
        driver.document_ids.extend(
            outcomes
                .iter()
                .filter_map(|outcome| outcome.document_id.clone()),
        );
        if driver.identity_id.is_none() {
            driver.identity_id = Some(identity.id.clone());
        }
        driver.transition_to(DriverStatus::PendingInduction);
        driver.compliance_status = ComplianceStatus::PendingReview;
        driver.induction_submitted_at = Some(now);
        driver.updated_at = now;
        let driver = self.store.update_driver(driver).await?;
        Ok((contact, driver, outcomes))
    }

    async fn release_token_claim(&self, token_hash: &str) {
        match self.store.release_token(token_hash).await {
            Ok(true) => info!("induction link released after the submission failed"),
            Ok(false) => warn!("induction link was not held when releasing it"),
            Err(err) => error!(error = %err, "induction link could not be released"),
        }
    }

    /// Staff approval: activate the identity with the default credentials and mark the
    /// driver compliant.
    #[instrument(skip_all, fields(driver_id = %driver_id))]
    pub async fn approve_induction(
        &self,
        driver_id: &DriverId,
        actor: &IdentityId,
    ) -> Result<ApprovalResult, OnboardingError> {
        self.require_staff(actor, "approve inductions").await?;
        let driver = self.driver(driver_id).await?;

        let status = driver.driver_status();
        if status != DriverStatus::PendingInduction {
            return Err(OnboardingError::StateConflict {
                action: "approve induction",
                expected: "PENDING_INDUCTION",
                actual: status,
            });
        }

        let now = self.clock.now();
        let mut identity = self.reconciler(now).identity_for_approval(&driver).await?;
        identity.status = AccountStatus::Active;
        identity.approval_status = ApprovalStatus::Approved;
        identity.password_hash = Some(hash_password(self.policy.default_password.expose())?);
        identity.must_change_password = true;
        identity.permissions = self.policy.permissions.clone();
        identity.updated_at = now;
        let identity = self.store.update_identity(identity).await?;

        let mut driver = driver;
        driver.transition_to(DriverStatus::Compliant);
        driver.compliance_status = ComplianceStatus::Compliant;
        driver.approved_at = Some(now);
        driver.approved_by = Some(actor.clone());
        driver.identity_id = Some(identity.id.clone());
        driver.updated_at = now;
        let driver = self.store.update_driver(driver).await?;

        if !persisted_as_approved(&driver, &identity) {
            error!(
                driver_code = %driver.driver_code,
                status = %driver.driver_status(),
                is_active = driver.is_active(),
                "approved driver did not persist as compliant and active"
            );
        }

        let first_name = self
            .store
            .find_contact(&driver.contact_id)
            .await
            .ok()
            .flatten()
            .map(|contact| contact.greeting_name().to_string())
            .unwrap_or_else(|| "there".to_string());
        let credentials = ApprovedEmail {
            to: identity.email.clone(),
            first_name,
            username: identity.username.clone(),
            password: self.policy.default_password.expose().to_string(),
        };
        if let Err(err) = self.mailer.send_approved_email(credentials).await {
            warn!(driver_code = %driver.driver_code, error = %err, "approval email failed; credentials can be resent by staff");
        }

        info!(
            driver_code = %driver.driver_code,
            approved_by = %actor,
            "driver approved"
        );

        Ok(ApprovalResult {
            driver: DriverView::from(&driver),
            user: IdentityView::from(&identity),
        })
    }

    /// Repairs the identity-to-driver link, locating the driver through the contact email
    /// when the direct link is missing.
    #[instrument(skip_all, fields(identity_id = %identity_id))]
    pub async fn sync_identity_link(
        &self,
        identity_id: &IdentityId,
    ) -> Result<LinkRepair, OnboardingError> {
        let identity = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(OnboardingError::NotFound { entity: "identity" })?;

        if let Some(driver) = self.store.find_driver_by_identity(&identity.id).await? {
            return Ok(LinkRepair {
                outcome: LinkOutcome::AlreadyLinked,
                message: "driver profile already linked to this identity".to_string(),
                driver: DriverView::from(&driver),
                user: IdentityView::from(&identity),
            });
        }

        let contact = self
            .store
            .find_contact_by_email(&identity.email)
            .await?
            .ok_or(OnboardingError::NotFound { entity: "contact" })?;
        let mut driver = self
            .store
            .find_driver_by_contact(&contact.id)
            .await?
            .ok_or(OnboardingError::NotFound {
                entity: "driver profile",
            })?;

        let previous = driver.identity_id.replace(identity.id.clone());
        driver.updated_at = self.clock.now();
        let driver = self.store.update_driver(driver).await?;

        warn!(
            driver_code = %driver.driver_code,
            previous_identity = previous.as_ref().map(IdentityId::as_str).unwrap_or("none"),
            "driver identity link repaired"
        );

        Ok(LinkRepair {
            outcome: LinkOutcome::Relinked,
            message: "driver profile re-linked to this identity".to_string(),
            driver: DriverView::from(&driver),
            user: IdentityView::from(&identity),
        })
    }

    /// Staff promotion of an applicant from `PENDING_RECRUIT` to `NEW_RECRUIT`.
    pub async fn shortlist_recruit(
        &self,
        driver_id: &DriverId,
        actor: &IdentityId,
    ) -> Result<DriverView, OnboardingError> {
        self.require_staff(actor, "shortlist recruits").await?;
        let mut driver = self.driver(driver_id).await?;

        let status = driver.driver_status();
        if status != DriverStatus::PendingRecruit {
            return Err(OnboardingError::StateConflict {
                action: "shortlist recruit",
                expected: "PENDING_RECRUIT",
                actual: status,
            });
        }

        driver.transition_to(DriverStatus::NewRecruit);
        driver.updated_at = self.clock.now();
        let driver = self.store.update_driver(driver).await?;
        info!(driver_code = %driver.driver_code, shortlisted_by = %actor, "recruit shortlisted");
        Ok(DriverView::from(&driver))
    }

    /// Issues a fresh induction link for the driver's open application.
    pub async fn resend_induction_link(
        &self,
        driver_id: &DriverId,
        actor: &IdentityId,
    ) -> Result<InductionLinkReceipt, OnboardingError> {
        self.require_staff(actor, "resend induction links").await?;
        let driver = self.driver(driver_id).await?;

        let status = driver.driver_status();
        if status == DriverStatus::Compliant {
            return Err(OnboardingError::StateConflict {
                action: "resend induction link",
                expected: "PENDING_RECRUIT, NEW_RECRUIT or PENDING_INDUCTION",
                actual: status,
            });
        }

        let application = self
            .store
            .latest_pending_application(&driver.id)
            .await?
            .ok_or(OnboardingError::NotFound {
                entity: "pending application",
            })?;
        let contact = self
            .store
            .find_contact(&driver.contact_id)
            .await?
            .ok_or(OnboardingError::NotFound { entity: "contact" })?;

        let now = self.clock.now();
        let (raw_token, token) = self
            .issue_token(&contact.email, &application.id, now)
            .await?;
        self.send_induction_link(&contact, &raw_token, &token).await;

        info!(driver_code = %driver.driver_code, requested_by = %actor, "induction link reissued");
        Ok(InductionLinkReceipt {
            application_id: application.id,
            email: token.email,
            expires_at: token.expires_at,
        })
    }

    /// Staff review queue: drivers awaiting approval, oldest submission first.
    pub async fn pending_inductions(
        &self,
        actor: &IdentityId,
        limit: usize,
    ) -> Result<Vec<DriverView>, OnboardingError> {
        self.require_staff(actor, "review inductions").await?;
        let drivers = self
            .store
            .drivers_with_status(DriverStatus::PendingInduction, limit)
            .await?;
        Ok(drivers.iter().map(DriverView::from).collect())
    }

    pub async fn compliance_documents(
        &self,
        driver_id: &DriverId,
        actor: &IdentityId,
    ) -> Result<Vec<ComplianceDocument>, OnboardingError> {
        self.require_staff(actor, "view compliance documents").await?;
        let driver = self.driver(driver_id).await?;
        Ok(self.store.documents_for_driver(&driver.id).await?)
    }

    async fn driver(&self, driver_id: &DriverId) -> Result<DriverProfile, OnboardingError> {
        self.store
            .find_driver(driver_id)
            .await?
            .ok_or(OnboardingError::NotFound {
                entity: "driver profile",
            })
    }

    async fn require_staff(
        &self,
        actor: &IdentityId,
        action: &'static str,
    ) -> Result<Identity, OnboardingError> {
        match self.store.find_identity(actor).await? {
            Some(identity)
                if identity.role.is_staff() && identity.status == AccountStatus::Active =>
            {
                Ok(identity)
            }
            _ => {
                warn!(actor = %actor, action, "staff action refused");
                Err(OnboardingError::Forbidden(action))
            }
        }
    }

    async fn issue_token(
        &self,
        email: &str,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<(String, InductionToken), OnboardingError> {
        let secret = InductionSecret::generate();
        let token = self
            .store
            .insert_token(InductionToken {
                token_hash: secret.digest(),
                email: email.to_string(),
                application_id: application_id.clone(),
                expires_at: now + self.policy.token_ttl,
                used: false,
                used_at: None,
                created_at: now,
            })
            .await?;
        Ok((secret.encode(), token))
    }

    async fn send_induction_link(&self, contact: &Contact, raw_token: &str, token: &InductionToken) {
        let email = ApplicationEmail {
            to: contact.email.clone(),
            first_name: contact.greeting_name().to_string(),
            induction_link: self.policy.induction_link(raw_token, &token.email),
            expires_at: token.expires_at,
        };
        if let Err(err) = self.mailer.send_application_email(email).await {
            warn!(
                application_id = %token.application_id,
                error = %err,
                "induction link email failed; staff can resend the link"
            );
        }
    }
}

fn username_taken() -> OnboardingError {
    OnboardingError::Validation(ValidationErrors::single("username", "is already taken"))
}

fn persisted_as_approved(driver: &DriverProfile, identity: &Identity) -> bool {
    driver.is_approved_driver()
        && driver.compliance_status == ComplianceStatus::Compliant
        && driver.identity_id.as_ref() == Some(&identity.id)
        && identity.status == AccountStatus::Active
}
