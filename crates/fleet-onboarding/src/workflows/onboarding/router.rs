use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::domain::{DriverId, IdentityId};
use super::errors::OnboardingError;
use super::payloads::{ApplicationSubmission, InductionAccess, InductionSubmission};
use super::repository::{DocumentStore, Mailer, OnboardingStore};
use super::service::{DriverOnboardingService, DEFAULT_PENDING_LIMIT};

/// Identity of the staff member performing a back-office action.
pub const STAFF_HEADER: &str = "x-staff-id";
/// Identity of a signed-in driver submitting their own induction form.
pub const IDENTITY_HEADER: &str = "x-identity-id";

const MAX_PENDING_LIMIT: usize = 200;

type SharedService<S, D, M> = Arc<DriverOnboardingService<S, D, M>>;

/// Router builder exposing the onboarding endpoints.
pub fn onboarding_router<S, D, M>(service: SharedService<S, D, M>) -> Router
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let induction_body_limit = service.policy().documents.request_body_limit();
    Router::new()
        .route(
            "/api/v1/onboarding/applications",
            post(submit_application_handler::<S, D, M>),
        )
        .route(
            "/api/v1/onboarding/induction/validate",
            get(validate_token_handler::<S, D, M>),
        )
        .route(
            "/api/v1/onboarding/induction",
            post(submit_induction_handler::<S, D, M>)
                .layer(DefaultBodyLimit::max(induction_body_limit)),
        )
        .route(
            "/api/v1/onboarding/inductions/pending",
            get(pending_inductions_handler::<S, D, M>),
        )
        .route(
            "/api/v1/onboarding/drivers/:driver_id/shortlist",
            post(shortlist_handler::<S, D, M>),
        )
        .route(
            "/api/v1/onboarding/drivers/:driver_id/induction-link",
            post(resend_link_handler::<S, D, M>),
        )
        .route(
            "/api/v1/onboarding/drivers/:driver_id/approve",
            post(approve_handler::<S, D, M>),
        )
        .route(
            "/api/v1/onboarding/drivers/:driver_id/documents",
            get(documents_handler::<S, D, M>),
        )
        .route(
            "/api/v1/onboarding/identities/:identity_id/sync",
            post(sync_identity_handler::<S, D, M>),
        )
        .with_state(service)
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, OnboardingError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn header_identity(headers: &HeaderMap, name: &str) -> Option<IdentityId> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| IdentityId(value.to_string()))
}

fn staff_actor(headers: &HeaderMap) -> Result<IdentityId, OnboardingError> {
    header_identity(headers, STAFF_HEADER)
        .ok_or(OnboardingError::Forbidden("perform staff actions"))
}

pub(crate) async fn submit_application_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Json(submission): Json<ApplicationSubmission>,
) -> Response
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::CREATED,
        service.submit_application(submission).await,
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenQuery {
    token: Option<String>,
    email: Option<String>,
}

pub(crate) async fn validate_token_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Query(query): Query<TokenQuery>,
) -> Response
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let token = query.token.unwrap_or_default();
    let email = query.email.unwrap_or_default();
    respond(
        StatusCode::OK,
        service.validate_induction_token(&token, &email).await,
    )
}

pub(crate) async fn submit_induction_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    headers: HeaderMap,
    Json(submission): Json<InductionSubmission>,
) -> Response
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let access = match header_identity(&headers, IDENTITY_HEADER) {
        Some(identity_id) => InductionAccess::Authenticated(identity_id),
        None => match submission.token.clone() {
            Some(token) => InductionAccess::Token(token),
            None => return OnboardingError::InvalidToken.into_response(),
        },
    };
    respond(
        StatusCode::OK,
        service.submit_induction_form(submission, access).await,
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct PendingQuery {
    limit: Option<usize>,
}

pub(crate) async fn pending_inductions_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    headers: HeaderMap,
    Query(query): Query<PendingQuery>,
) -> Response
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let actor = match staff_actor(&headers) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PENDING_LIMIT)
        .clamp(1, MAX_PENDING_LIMIT);
    respond(
        StatusCode::OK,
        service.pending_inductions(&actor, limit).await,
    )
}

pub(crate) async fn shortlist_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(driver_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let actor = match staff_actor(&headers) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    respond(
        StatusCode::OK,
        service
            .shortlist_recruit(&DriverId(driver_id), &actor)
            .await,
    )
}

pub(crate) async fn resend_link_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(driver_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let actor = match staff_actor(&headers) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    respond(
        StatusCode::OK,
        service
            .resend_induction_link(&DriverId(driver_id), &actor)
            .await,
    )
}

pub(crate) async fn approve_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(driver_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let actor = match staff_actor(&headers) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    respond(
        StatusCode::OK,
        service
            .approve_induction(&DriverId(driver_id), &actor)
            .await,
    )
}

pub(crate) async fn documents_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(driver_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    let actor = match staff_actor(&headers) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    respond(
        StatusCode::OK,
        service
            .compliance_documents(&DriverId(driver_id), &actor)
            .await,
    )
}

pub(crate) async fn sync_identity_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(identity_id): Path<String>,
) -> Response
where
    S: OnboardingStore + 'static,
    D: DocumentStore + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        service.sync_identity_link(&IdentityId(identity_id)).await,
    )
}
