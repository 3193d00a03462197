use chrono::{DateTime, Duration, Utc};
use url::Url;

use crate::config::{ConfigError, DefaultPassword, OnboardingConfig};

use super::documents::DocumentPolicy;

/// Permissions granted to every driver at approval.
pub const DRIVER_PERMISSIONS: [&str; 6] = [
    "driver:dashboard:view",
    "driver:jobs:view",
    "driver:jobs:accept",
    "driver:documents:upload",
    "driver:profile:edit",
    "driver:payments:view",
];

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Runtime rules of the onboarding workflow, resolved from configuration.
#[derive(Debug, Clone)]
pub struct OnboardingPolicy {
    pub portal_url: Url,
    pub token_ttl: Duration,
    pub documents: DocumentPolicy,
    pub default_password: DefaultPassword,
    pub permissions: Vec<String>,
}

impl OnboardingPolicy {
    pub fn from_config(config: &OnboardingConfig) -> Result<Self, ConfigError> {
        let portal_url = Url::parse(&config.portal_url)
            .map_err(|source| ConfigError::InvalidPortalUrl { source })?;
        Ok(Self {
            portal_url,
            token_ttl: Duration::days(config.token_ttl_days),
            documents: DocumentPolicy::new(config.max_document_bytes),
            default_password: config.default_password.clone(),
            permissions: DRIVER_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
        })
    }

    /// Link emailed to the applicant: the portal URL with `token` and `email` appended.
    pub fn induction_link(&self, raw_token: &str, email: &str) -> String {
        let mut link = self.portal_url.clone();
        link.query_pairs_mut()
            .append_pair("token", raw_token)
            .append_pair("email", email);
        link.into()
    }
}
