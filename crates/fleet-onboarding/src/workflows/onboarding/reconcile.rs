//! Locates or creates the identity, contact and driver profile that belong together.
//!
//! Inserts that lose a race on a unique key re-read the winner instead of failing, so
//! concurrent submissions for one email converge on a single set of records.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::credentials::{generate_temporary_password, hash_password};
use super::domain::{
    ComplianceStatus, Contact, ContactDetails, DriverProfile, Identity, IdentityId,
};
use super::errors::OnboardingError;
use super::repository::{OnboardingStore, StoreError};
use super::validation::ValidatedApplication;

/// The three records describing one driver.
#[derive(Debug, Clone)]
pub(crate) struct DriverRecords {
    pub identity: Identity,
    pub contact: Contact,
    pub driver: DriverProfile,
}

pub(crate) struct Reconciler<'a, S: ?Sized> {
    store: &'a S,
    now: DateTime<Utc>,
}

fn generated_username() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("driver-{}", &suffix[..12])
}

pub(crate) fn already_compliant(email: &str) -> OnboardingError {
    OnboardingError::Conflict(format!(
        "{email} already belongs to an approved, active driver"
    ))
}

impl<'a, S> Reconciler<'a, S>
where
    S: OnboardingStore + ?Sized,
{
    pub fn new(store: &'a S, now: DateTime<Utc>) -> Self {
        Self { store, now }
    }

    /// Finds the identity for `email`, creating a pending one with a random password.
    pub async fn identity_for_email(&self, email: &str) -> Result<Identity, OnboardingError> {
        if let Some(identity) = self.store.find_identity_by_email(email).await? {
            return Ok(identity);
        }

        let temporary = generate_temporary_password();
        let password_hash = hash_password(temporary.expose())?;
        let identity = Identity::pending_driver(email, password_hash.clone(), self.now);
        match self.store.insert_identity(identity).await {
            Ok(identity) => {
                info!(identity_id = %identity.id, "identity created");
                return Ok(identity);
            }
            Err(StoreError::Conflict) => {}
            Err(err) => return Err(err.into()),
        }

        if let Some(identity) = self.store.find_identity_by_email(email).await? {
            return Ok(identity);
        }

        // The email is free, so the clash is another account already using it as a username.
        let mut identity = Identity::pending_driver(email, password_hash, self.now);
        identity.username = generated_username();
        warn!(username = %identity.username, "email taken as a username; generated one instead");
        match self.store.insert_identity(identity).await {
            Ok(identity) => {
                info!(identity_id = %identity.id, "identity created");
                Ok(identity)
            }
            Err(StoreError::Conflict) => self
                .store
                .find_identity_by_email(email)
                .await?
                .ok_or_else(|| {
                    OnboardingError::Conflict(format!("account for {email} could not be created"))
                }),
            Err(err) => Err(err.into()),
        }
    }

    /// Creates the contact for `email` or merges `details` into the existing one.
    pub async fn contact_for_email(
        &self,
        email: &str,
        details: &ContactDetails,
    ) -> Result<Contact, OnboardingError> {
        if let Some(contact) = self.store.find_contact_by_email(email).await? {
            return self.merge_contact(contact, details).await;
        }

        match self
            .store
            .insert_contact(Contact::new(email, details, self.now))
            .await
        {
            Ok(contact) => Ok(contact),
            Err(StoreError::Conflict) => {
                let contact = self
                    .store
                    .find_contact_by_email(email)
                    .await?
                    .ok_or(OnboardingError::NotFound { entity: "contact" })?;
                self.merge_contact(contact, details).await
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn merge_contact(
        &self,
        mut contact: Contact,
        details: &ContactDetails,
    ) -> Result<Contact, OnboardingError> {
        contact.merge(details, self.now);
        Ok(self.store.update_contact(contact).await?)
    }

    /// Driver profile reachable from the identity, or from the contact holding `email`.
    pub async fn existing_driver(
        &self,
        identity_id: &IdentityId,
        email: &str,
    ) -> Result<Option<DriverProfile>, OnboardingError> {
        if let Some(driver) = self.store.find_driver_by_identity(identity_id).await? {
            return Ok(Some(driver));
        }
        match self.store.find_contact_by_email(email).await? {
            Some(contact) => Ok(self.store.find_driver_by_contact(&contact.id).await?),
            None => Ok(None),
        }
    }

    /// Creates the recruit profile, or resets a not-yet-compliant one back to recruitment.
    pub async fn recruit(
        &self,
        identity: &Identity,
        contact: &Contact,
        existing: Option<DriverProfile>,
        form: &ValidatedApplication,
    ) -> Result<DriverProfile, OnboardingError> {
        if let Some(driver) = existing {
            return self.refresh_recruit(driver, identity, form).await;
        }

        let driver_code = self.store.next_driver_code().await?;
        let driver = DriverProfile::recruit(
            driver_code,
            &identity.id,
            contact,
            form.starting_status,
            form.classification.clone(),
            self.now,
        );

        match self.store.insert_driver(driver).await {
            Ok(driver) => {
                info!(driver_code = %driver.driver_code, "driver profile created");
                Ok(driver)
            }
            Err(StoreError::Conflict) => {
                let raced = self
                    .existing_driver(&identity.id, &contact.email)
                    .await?
                    .ok_or_else(|| {
                        OnboardingError::Conflict(
                            "driver profile conflicts with an existing record".to_string(),
                        )
                    })?;
                self.refresh_recruit(raced, identity, form).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn refresh_recruit(
        &self,
        mut driver: DriverProfile,
        identity: &Identity,
        form: &ValidatedApplication,
    ) -> Result<DriverProfile, OnboardingError> {
        if driver.is_approved_driver() {
            return Err(already_compliant(&form.email));
        }

        if driver.driver_status() != form.starting_status {
            info!(
                driver_code = %driver.driver_code,
                from = %driver.driver_status(),
                to = %form.starting_status,
                "driver returned to recruitment"
            );
        }
        driver.transition_to(form.starting_status);
        driver.compliance_status = ComplianceStatus::NotSubmitted;
        driver.classification = form.classification.clone();
        if driver.identity_id.is_none() {
            driver.identity_id = Some(identity.id.clone());
        }
        driver.updated_at = self.now;
        Ok(self.store.update_driver(driver).await?)
    }

    /// Records for the person holding `email`, found through the contact.
    pub async fn records_for_email(&self, email: &str) -> Result<DriverRecords, OnboardingError> {
        let contact = self
            .store
            .find_contact_by_email(email)
            .await?
            .ok_or(OnboardingError::NotFound { entity: "contact" })?;
        let driver = self
            .store
            .find_driver_by_contact(&contact.id)
            .await?
            .ok_or(OnboardingError::NotFound {
                entity: "driver profile",
            })?;
        let identity = match self.linked_identity(&driver).await? {
            Some(identity) => identity,
            None => self
                .store
                .find_identity_by_email(email)
                .await?
                .ok_or(OnboardingError::NotFound { entity: "identity" })?,
        };

        Ok(DriverRecords {
            identity,
            contact,
            driver,
        })
    }

    /// Records for a signed-in identity.
    pub async fn records_for_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<DriverRecords, OnboardingError> {
        let identity = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(OnboardingError::NotFound { entity: "identity" })?;
        let driver = self
            .existing_driver(&identity.id, &identity.email)
            .await?
            .ok_or(OnboardingError::NotFound {
                entity: "driver profile",
            })?;
        let contact = self
            .store
            .find_contact(&driver.contact_id)
            .await?
            .ok_or(OnboardingError::NotFound { entity: "contact" })?;

        Ok(DriverRecords {
            identity,
            contact,
            driver,
        })
    }

    async fn linked_identity(
        &self,
        driver: &DriverProfile,
    ) -> Result<Option<Identity>, OnboardingError> {
        match &driver.identity_id {
            Some(identity_id) => Ok(self.store.find_identity(identity_id).await?),
            None => Ok(None),
        }
    }

    /// Identity to activate at approval: the linked one, else the one holding the contact
    /// email, else a newly created one.
    pub async fn identity_for_approval(
        &self,
        driver: &DriverProfile,
    ) -> Result<Identity, OnboardingError> {
        if let Some(identity) = self.linked_identity(driver).await? {
            return Ok(identity);
        }

        let email = match self.store.find_contact(&driver.contact_id).await? {
            Some(contact) => contact.email,
            None => driver.email.clone(),
        };

        if let Some(identity) = self.store.find_identity_by_email(&email).await? {
            warn!(
                driver_code = %driver.driver_code,
                identity_id = %identity.id,
                "driver identity link was broken; re-linking by contact email"
            );
            return Ok(identity);
        }

        warn!(driver_code = %driver.driver_code, "no identity for driver; creating one");
        self.identity_for_email(&email).await
    }
}
