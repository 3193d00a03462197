//! Process-local store backing the API binary and the test suites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, ComplianceDocument, Contact, ContactId,
    DriverCode, DriverId, DriverProfile, DriverStatus, Identity, IdentityId, InductionToken,
};
use super::repository::{
    ApplicationStore, ComplianceDocumentStore, ContactStore, DriverProfileStore,
    IdentityStore, InductionTokenStore, StoreError,
};

#[derive(Default)]
struct MemoryState {
    identities: HashMap<IdentityId, Identity>,
    contacts: HashMap<ContactId, Contact>,
    drivers: HashMap<DriverId, DriverProfile>,
    applications: HashMap<ApplicationId, ApplicationRecord>,
    tokens: HashMap<String, InductionToken>,
    documents: Vec<ComplianceDocument>,
    driver_sequence: u64,
}

/// Record totals, used to assert that reconciliation never duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub identities: usize,
    pub contacts: usize,
    pub drivers: usize,
    pub applications: usize,
    pub tokens: usize,
    pub documents: usize,
}

/// Every store trait over one mutex, so each call is atomic with respect to the others.
#[derive(Clone, Default)]
pub struct InMemoryOnboardingStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryOnboardingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("onboarding store lock poisoned".to_string()))
    }

    pub fn counts(&self) -> Result<RecordCounts, StoreError> {
        let state = self.lock()?;
        Ok(RecordCounts {
            identities: state.identities.len(),
            contacts: state.contacts.len(),
            drivers: state.drivers.len(),
            applications: state.applications.len(),
            tokens: state.tokens.len(),
            documents: state.documents.len(),
        })
    }

    pub fn applications_for_email(&self, email: &str) -> Result<Vec<ApplicationRecord>, StoreError> {
        let state = self.lock()?;
        let mut records: Vec<_> = state
            .applications
            .values()
            .filter(|record| record.email == email)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.submitted_at);
        Ok(records)
    }
}

fn same_username(left: &str, right: &str) -> bool {
    left.eq_ignore_ascii_case(right)
}

impl MemoryState {
    fn identity_clashes(&self, candidate: &Identity) -> bool {
        self.identities.values().any(|existing| {
            existing.id != candidate.id
                && (existing.email == candidate.email
                    || same_username(&existing.username, &candidate.username))
        })
    }

    fn driver_clashes(&self, candidate: &DriverProfile) -> bool {
        self.drivers.values().any(|existing| {
            existing.id != candidate.id
                && (existing.contact_id == candidate.contact_id
                    || existing.driver_code == candidate.driver_code
                    || (candidate.identity_id.is_some()
                        && existing.identity_id == candidate.identity_id))
        })
    }
}

#[async_trait]
impl IdentityStore for InMemoryOnboardingStore {
    async fn find_identity(&self, id: &IdentityId) -> Result<Option<Identity>, StoreError> {
        Ok(self.lock()?.identities.get(id).cloned())
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn find_identity_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|identity| same_username(&identity.username, username))
            .cloned())
    }

    async fn insert_identity(&self, identity: Identity) -> Result<Identity, StoreError> {
        let mut state = self.lock()?;
        if state.identities.contains_key(&identity.id) || state.identity_clashes(&identity) {
            return Err(StoreError::Conflict);
        }
        state.identities.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn update_identity(&self, identity: Identity) -> Result<Identity, StoreError> {
        let mut state = self.lock()?;
        if !state.identities.contains_key(&identity.id) {
            return Err(StoreError::NotFound);
        }
        if state.identity_clashes(&identity) {
            return Err(StoreError::Conflict);
        }
        state.identities.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }
}

#[async_trait]
impl ContactStore for InMemoryOnboardingStore {
    async fn find_contact(&self, id: &ContactId) -> Result<Option<Contact>, StoreError> {
        Ok(self.lock()?.contacts.get(id).cloned())
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, StoreError> {
        Ok(self
            .lock()?
            .contacts
            .values()
            .find(|contact| contact.email == email)
            .cloned())
    }

    async fn insert_contact(&self, contact: Contact) -> Result<Contact, StoreError> {
        let mut state = self.lock()?;
        let clash = state
            .contacts
            .values()
            .any(|existing| existing.id == contact.id || existing.email == contact.email);
        if clash {
            return Err(StoreError::Conflict);
        }
        state.contacts.insert(contact.id.clone(), contact.clone());
        Ok(contact)
    }

    async fn update_contact(&self, contact: Contact) -> Result<Contact, StoreError> {
        let mut state = self.lock()?;
        if !state.contacts.contains_key(&contact.id) {
            return Err(StoreError::NotFound);
        }
        let clash = state
            .contacts
            .values()
            .any(|existing| existing.id != contact.id && existing.email == contact.email);
        if clash {
            return Err(StoreError::Conflict);
        }
        state.contacts.insert(contact.id.clone(), contact.clone());
        Ok(contact)
    }
}

#[async_trait]
impl DriverProfileStore for InMemoryOnboardingStore {
    async fn find_driver(&self, id: &DriverId) -> Result<Option<DriverProfile>, StoreError> {
        Ok(self.lock()?.drivers.get(id).cloned())
    }

    async fn find_driver_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<DriverProfile>, StoreError> {
        Ok(self
            .lock()?
            .drivers
            .values()
            .find(|driver| driver.identity_id.as_ref() == Some(identity_id))
            .cloned())
    }

    async fn find_driver_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<DriverProfile>, StoreError> {
        Ok(self
            .lock()?
            .drivers
            .values()
            .find(|driver| &driver.contact_id == contact_id)
            .cloned())
    }

    async fn insert_driver(&self, driver: DriverProfile) -> Result<DriverProfile, StoreError> {
        let mut state = self.lock()?;
        if state.drivers.contains_key(&driver.id) || state.driver_clashes(&driver) {
            return Err(StoreError::Conflict);
        }
        state.drivers.insert(driver.id.clone(), driver.clone());
        Ok(driver)
    }

    async fn update_driver(&self, driver: DriverProfile) -> Result<DriverProfile, StoreError> {
        let mut state = self.lock()?;
        if !state.drivers.contains_key(&driver.id) {
            return Err(StoreError::NotFound);
        }
        if state.driver_clashes(&driver) {
            return Err(StoreError::Conflict);
        }
        state.drivers.insert(driver.id.clone(), driver.clone());
        Ok(driver)
    }

    async fn next_driver_code(&self) -> Result<DriverCode, StoreError> {
        let mut state = self.lock()?;
        state.driver_sequence += 1;
        Ok(DriverCode::from_sequence(state.driver_sequence))
    }

    async fn drivers_with_status(
        &self,
        status: DriverStatus,
        limit: usize,
    ) -> Result<Vec<DriverProfile>, StoreError> {
        let state = self.lock()?;
        let mut drivers: Vec<_> = state
            .drivers
            .values()
            .filter(|driver| driver.driver_status() == status)
            .cloned()
            .collect();
        drivers.sort_by_key(|driver| {
            (
                driver.induction_submitted_at.unwrap_or(driver.updated_at),
                driver.driver_code.0.clone(),
            )
        });
        drivers.truncate(limit);
        Ok(drivers)
    }
}

#[async_trait]
impl ApplicationStore for InMemoryOnboardingStore {
    async fn insert_application(
        &self,
        application: ApplicationRecord,
    ) -> Result<ApplicationRecord, StoreError> {
        let mut state = self.lock()?;
        if state.applications.contains_key(&application.id) {
            return Err(StoreError::Conflict);
        }
        state
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    async fn find_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        Ok(self.lock()?.applications.get(id).cloned())
    }

    async fn latest_pending_application(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        Ok(self
            .lock()?
            .applications
            .values()
            .filter(|record| {
                &record.driver_id == driver_id
                    && record.status == ApplicationStatus::PendingInduction
            })
            .max_by_key(|record| record.submitted_at)
            .cloned())
    }

    async fn complete_application(
        &self,
        id: &ApplicationId,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        let mut state = self.lock()?;
        let Some(record) = state.applications.get_mut(id) else {
            return Ok(None);
        };
        if record.status == ApplicationStatus::PendingInduction {
            record.status = ApplicationStatus::Completed;
            record.completed_at = Some(completed_at);
        }
        Ok(Some(record.clone()))
    }
}

#[async_trait]
impl InductionTokenStore for InMemoryOnboardingStore {
    async fn insert_token(&self, token: InductionToken) -> Result<InductionToken, StoreError> {
        let mut state = self.lock()?;
        if state.tokens.contains_key(&token.token_hash) {
            return Err(StoreError::Conflict);
        }
        state.tokens.insert(token.token_hash.clone(), token.clone());
        Ok(token)
    }

    async fn find_token(&self, token_hash: &str) -> Result<Option<InductionToken>, StoreError> {
        Ok(self.lock()?.tokens.get(token_hash).cloned())
    }

    async fn consume_token(
        &self,
        token_hash: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InductionToken>, StoreError> {
        let mut state = self.lock()?;
        match state.tokens.get_mut(token_hash) {
            Some(token) if token.is_redeemable(email, now) => {
                token.used = true;
                token.used_at = Some(now);
                Ok(Some(token.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release_token(&self, token_hash: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.tokens.get_mut(token_hash) {
            Some(token) if token.used => {
                token.used = false;
                token.used_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ComplianceDocumentStore for InMemoryOnboardingStore {
    async fn insert_document(
        &self,
        document: ComplianceDocument,
    ) -> Result<ComplianceDocument, StoreError> {
        let mut state = self.lock()?;
        if state.documents.iter().any(|existing| existing.id == document.id) {
            return Err(StoreError::Conflict);
        }
        state.documents.push(document.clone());
        Ok(document)
    }

    async fn documents_for_driver(
        &self,
        driver_id: &DriverId,
    ) -> Result<Vec<ComplianceDocument>, StoreError> {
        Ok(self
            .lock()?
            .documents
            .iter()
            .filter(|document| &document.driver_id == driver_id)
            .cloned()
            .collect())
    }
}
