use async_trait::async_trait;
use chrono::Utc;
use fleet_onboarding::workflows::onboarding::repository::IdentityStore;
use fleet_onboarding::workflows::onboarding::{
    ApplicationEmail, ApprovedEmail, DocumentStore, DocumentStoreError, Identity, IdentityId,
    InMemoryOnboardingStore, InductionSubmittedEmail, Mailer, NotificationError, StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub(crate) const DEFAULT_STAFF_EMAIL: &str = "ops@fleet.local";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mailer that writes outgoing notifications to the log instead of a relay.
///
/// Only recipients reach the log. The outbox keeping induction links exists for the
/// local walkthrough and stays off for the server.
#[derive(Default, Clone)]
pub(crate) struct LoggingMailer {
    outbox: Option<Arc<Mutex<Vec<(String, String)>>>>,
}

impl LoggingMailer {
    pub(crate) fn with_outbox() -> Self {
        Self {
            outbox: Some(Arc::default()),
        }
    }

    pub(crate) fn latest_link_for(&self, email: &str) -> Option<String> {
        let outbox = self.outbox.as_ref()?;
        let guard = match outbox.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, link)| link.clone())
    }
}

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send_application_email(
        &self,
        email: ApplicationEmail,
    ) -> Result<(), NotificationError> {
        info!(to = %email.to, expires_at = %email.expires_at, "induction link issued");
        if let Some(outbox) = &self.outbox {
            let mut guard = outbox
                .lock()
                .map_err(|_| NotificationError::Transport("outbox lock poisoned".to_string()))?;
            guard.push((email.to, email.induction_link));
        }
        Ok(())
    }

    async fn send_induction_submitted_email(
        &self,
        email: InductionSubmittedEmail,
    ) -> Result<(), NotificationError> {
        info!(to = %email.to, driver_code = %email.driver_code, "induction receipt sent");
        Ok(())
    }

    async fn send_approved_email(&self, email: ApprovedEmail) -> Result<(), NotificationError> {
        info!(to = %email.to, "approval credentials sent");
        Ok(())
    }
}

/// Process-local document bucket. Uploaded bytes live only as long as the server.
#[derive(Default, Clone)]
pub(crate) struct InMemoryDocumentStore {
    objects: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
}

impl InMemoryDocumentStore {
    pub(crate) fn len(&self) -> usize {
        self.objects.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn upload_document(
        &self,
        key: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, DocumentStoreError> {
        let mut guard = self
            .objects
            .lock()
            .map_err(|_| DocumentStoreError::Unavailable("bucket lock poisoned".to_string()))?;
        if guard.contains_key(key) {
            warn!(%key, "overwriting stored document");
        }
        guard.insert(key.to_string(), (mime_type.to_string(), bytes));
        Ok(format!("memory://{key}"))
    }
}

/// Ensures a staff account exists for back-office calls and returns its id.
pub(crate) async fn seed_staff_identity(
    store: &InMemoryOnboardingStore,
    email: &str,
) -> Result<IdentityId, StoreError> {
    if let Some(existing) = store.find_identity_by_email(email).await? {
        return Ok(existing.id);
    }
    let username = email.split('@').next().unwrap_or(email);
    let staff = store
        .insert_identity(Identity::staff(email, username, Utc::now()))
        .await?;
    info!(staff_id = %staff.id, %email, "seeded staff identity");
    Ok(staff.id)
}
