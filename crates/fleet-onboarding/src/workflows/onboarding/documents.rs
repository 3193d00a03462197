//! Per-document intake of induction uploads. A rejected or failed document never fails
//! the submission; each one gets its own outcome entry instead.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{
    ComplianceDocument, DocumentId, DocumentReviewStatus, DocumentType, DriverProfile,
};
use super::payloads::DocumentUpload;
use super::repository::{ComplianceDocumentStore, DocumentStore};

/// Accepted upload formats and the file extensions that may carry them.
const ACCEPTED_FORMATS: [(&str, &[&str]); 3] = [
    ("application/pdf", &["pdf"]),
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
];

const FORM_FIELDS_HEADROOM: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentPolicy {
    max_bytes: usize,
}

impl DocumentPolicy {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Largest induction request body worth reading: one base64-encoded document at the
    /// ceiling for every document type, plus room for the form fields.
    pub fn request_body_limit(&self) -> usize {
        let encoded = self.max_bytes.div_ceil(3).saturating_mul(4);
        encoded
            .saturating_mul(DocumentType::ALL.len())
            .saturating_add(FORM_FIELDS_HEADROOM)
    }

    /// Decodes and checks one upload; the error string is reported back to the caller.
    pub fn admit(&self, upload: &DocumentUpload) -> Result<AdmittedDocument, String> {
        let document_type = DocumentType::parse(&upload.document_type)
            .ok_or_else(|| format!("unknown document type '{}'", upload.document_type))?;

        let mime: mime::Mime = upload
            .mime_type
            .trim()
            .parse()
            .map_err(|_| format!("unparseable mime type '{}'", upload.mime_type))?;
        let essence = mime.essence_str().to_ascii_lowercase();

        let extensions = ACCEPTED_FORMATS
            .iter()
            .find(|(accepted, _)| *accepted == essence)
            .map(|(_, extensions)| *extensions)
            .ok_or_else(|| format!("mime type '{essence}' is not accepted"))?;

        let extension = upload
            .file_name
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase())
            .unwrap_or_default();
        if !extensions.contains(&extension.as_str()) {
            return Err(format!(
                "file name '{}' does not match mime type '{essence}'",
                upload.file_name
            ));
        }

        let bytes = STANDARD
            .decode(upload.content_base64.trim())
            .map_err(|_| "content is not valid base64".to_string())?;
        if bytes.is_empty() {
            return Err("document is empty".to_string());
        }
        if bytes.len() > self.max_bytes {
            return Err(format!(
                "document is {} bytes; the limit is {} bytes",
                bytes.len(),
                self.max_bytes
            ));
        }

        Ok(AdmittedDocument {
            document_type,
            file_name: upload.file_name.clone(),
            mime_type: essence,
            extension,
            bytes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedDocument {
    pub document_type: DocumentType,
    pub file_name: String,
    pub mime_type: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentOutcomeStatus {
    Stored,
    Rejected,
    Failed,
}

/// Result entry for one uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub document_type: String,
    pub file_name: String,
    pub status: DocumentOutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DocumentOutcome {
    fn skipped(upload: &DocumentUpload, status: DocumentOutcomeStatus, reason: String) -> Self {
        Self {
            document_type: upload.document_type.clone(),
            file_name: upload.file_name.clone(),
            status,
            document_id: None,
            reason: Some(reason),
        }
    }

    pub fn is_stored(&self) -> bool {
        self.status == DocumentOutcomeStatus::Stored
    }
}

/// Uploads each document for `driver` and records the stored ones.
pub(crate) async fn store_documents<S, D>(
    store: &S,
    blobs: &D,
    policy: &DocumentPolicy,
    driver: &DriverProfile,
    uploads: &[DocumentUpload],
    now: DateTime<Utc>,
) -> Vec<DocumentOutcome>
where
    S: ComplianceDocumentStore + ?Sized,
    D: DocumentStore + ?Sized,
{
    let mut outcomes = Vec::with_capacity(uploads.len());

    for upload in uploads {
        let admitted = match policy.admit(upload) {
            Ok(admitted) => admitted,
            Err(reason) => {
                warn!(
                    driver_code = %driver.driver_code,
                    document_type = %upload.document_type,
                    %reason,
                    "document rejected"
                );
                outcomes.push(DocumentOutcome::skipped(
                    upload,
                    DocumentOutcomeStatus::Rejected,
                    reason,
                ));
                continue;
            }
        };

        let key = format!(
            "drivers/{}/{}/{}.{}",
            driver.driver_code,
            admitted.document_type.slug(),
            Uuid::new_v4(),
            admitted.extension
        );
        let size_bytes = admitted.bytes.len() as u64;

        let url = match blobs
            .upload_document(&key, admitted.bytes, &admitted.mime_type)
            .await
        {
            Ok(url) => url,
            Err(err) => {
                warn!(driver_code = %driver.driver_code, %key, error = %err, "document upload failed");
                outcomes.push(DocumentOutcome::skipped(
                    upload,
                    DocumentOutcomeStatus::Failed,
                    err.to_string(),
                ));
                continue;
            }
        };

        let document = ComplianceDocument {
            id: DocumentId::generate(),
            driver_id: driver.id.clone(),
            document_type: admitted.document_type,
            storage_url: url,
            file_name: admitted.file_name,
            size_bytes,
            mime_type: admitted.mime_type,
            review_status: DocumentReviewStatus::Pending,
            uploaded_at: now,
        };

        match store.insert_document(document).await {
            Ok(stored) => {
                info!(
                    driver_code = %driver.driver_code,
                    document_type = stored.document_type.slug(),
                    size_bytes,
                    "compliance document stored"
                );
                outcomes.push(DocumentOutcome {
                    document_type: upload.document_type.clone(),
                    file_name: upload.file_name.clone(),
                    status: DocumentOutcomeStatus::Stored,
                    document_id: Some(stored.id),
                    reason: None,
                });
            }
            Err(err) => {
                warn!(driver_code = %driver.driver_code, error = %err, "document record not saved");
                outcomes.push(DocumentOutcome::skipped(
                    upload,
                    DocumentOutcomeStatus::Failed,
                    err.to_string(),
                ));
            }
        }
    }

    outcomes
}
