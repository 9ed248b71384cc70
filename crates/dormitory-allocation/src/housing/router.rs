use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use super::capacity::RoomLocator;
use super::domain::{
    Actor, ApplicationId, PaymentConfirmation, RegistrationRequest, RoomPreferences, StudentId,
};
use super::error::HousingError;
use super::service::{AssignmentMode, QueueFilter, RegistrationService};

/// Router builder exposing the allocation workflow over HTTP.
pub fn housing_router(service: Arc<RegistrationService>) -> Router {
    Router::new()
        .route("/api/v1/housing/applications", post(submit_handler))
        .route(
            "/api/v1/housing/applications/:application_id",
            get(status_handler),
        )
        .route(
            "/api/v1/housing/applications/:application_id/approve",
            post(approve_handler),
        )
        .route(
            "/api/v1/housing/applications/:application_id/reject",
            post(reject_handler),
        )
        .route(
            "/api/v1/housing/applications/:application_id/waitlist",
            post(waitlist_handler),
        )
        .route(
            "/api/v1/housing/applications/:application_id/payment",
            post(payment_handler),
        )
        .route(
            "/api/v1/housing/applications/:application_id/assign",
            post(assign_handler),
        )
        .route(
            "/api/v1/housing/applications/:application_id/check-in",
            post(check_in_handler),
        )
        .route(
            "/api/v1/housing/applications/:application_id/check-out",
            post(check_out_handler),
        )
        .route(
            "/api/v1/housing/applications/:application_id/checkout-request",
            post(checkout_request_handler),
        )
        .route(
            "/api/v1/housing/applications/:application_id/cancel",
            post(cancel_handler),
        )
        .route(
            "/api/v1/housing/students/:student_id/eligibility",
            get(eligibility_handler),
        )
        .route(
            "/api/v1/housing/students/:student_id/rooms/search",
            post(search_handler),
        )
        .route(
            "/api/v1/housing/students/:student_id/self-select",
            post(self_select_handler),
        )
        .route(
            "/api/v1/housing/years/:academic_year/expire",
            post(expire_handler),
        )
        .route(
            "/api/v1/housing/years/:academic_year/first-year-batch",
            post(batch_handler),
        )
        .route(
            "/api/v1/housing/years/:academic_year/queue",
            get(queue_handler),
        )
        .route("/api/v1/housing/consistency", get(consistency_handler))
        .route(
            "/api/v1/housing/consistency/repair",
            post(repair_handler),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminRequest {
    pub(crate) admin_id: String,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

impl AdminRequest {
    fn actor(&self) -> Actor {
        Actor::admin(self.admin_id.clone())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentRequest {
    pub(crate) admin_id: String,
    #[serde(flatten)]
    pub(crate) confirmation: PaymentConfirmation,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignRequest {
    pub(crate) admin_id: String,
    /// Absent means automatic placement.
    #[serde(default)]
    pub(crate) room: Option<RoomLocator>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StudentRequest {
    pub(crate) student_id: StudentId,
    #[serde(default)]
    pub(crate) reason: Option<String>,
    #[serde(default)]
    pub(crate) scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct YearQuery {
    pub(crate) academic_year: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchRequest {
    pub(crate) academic_year: String,
    #[serde(default)]
    pub(crate) preferences: Option<RoomPreferences>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelfSelectRequest {
    pub(crate) academic_year: String,
    pub(crate) room: RoomLocator,
}

/// Map a service error to a status code and JSON body.
///
/// System failures are logged here and answered with a generic message.
pub(crate) fn error_response(err: HousingError) -> Response {
    let status = match &err {
        HousingError::Validation(_) => StatusCode::BAD_REQUEST,
        HousingError::NotFound(_) => StatusCode::NOT_FOUND,
        HousingError::Ineligible { .. } => StatusCode::FORBIDDEN,
        HousingError::DuplicateStudent { .. }
        | HousingError::RoomFull { .. }
        | HousingError::RoomUnavailable { .. }
        | HousingError::IllegalTransition { .. }
        | HousingError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
        HousingError::FatalConsistency { .. } | HousingError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if err.is_business_outcome() {
        debug!(error = %err, status = status.as_u16(), "request refused");
    } else {
        error!(error = %err, "housing request failed");
    }

    let payload = json!({
        "error": err.public_message(),
        "retryable": err.is_retryable(),
    });
    (status, Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, HousingError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<RegistrationService>>,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    respond(
        StatusCode::CREATED,
        service.submit(request).map(|application| application.status_view()),
    )
}

pub(crate) async fn status_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
) -> Response {
    let id = ApplicationId(application_id);
    respond(
        StatusCode::OK,
        service.get(&id).map(|application| application.status_view()),
    )
}

pub(crate) async fn approve_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<AdminRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    respond(
        StatusCode::OK,
        service
            .approve(&id, &request.actor())
            .map(|application| application.status_view()),
    )
}

pub(crate) async fn reject_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<AdminRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    let actor = request.actor();
    respond(
        StatusCode::OK,
        service
            .reject(&id, &actor, request.reason)
            .map(|application| application.status_view()),
    )
}

pub(crate) async fn waitlist_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<AdminRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    let actor = request.actor();
    respond(
        StatusCode::OK,
        service
            .waitlist(&id, &actor, request.reason)
            .map(|application| application.status_view()),
    )
}

pub(crate) async fn payment_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<PaymentRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    let actor = Actor::admin(request.admin_id);
    respond(
        StatusCode::OK,
        service
            .confirm_payment(&id, &actor, request.confirmation)
            .map(|application| application.status_view()),
    )
}

pub(crate) async fn assign_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    let actor = Actor::admin(request.admin_id);
    let mode = match request.room {
        Some(locator) => AssignmentMode::Manual(locator),
        None => AssignmentMode::Automatic,
    };
    respond(StatusCode::OK, service.assign(&id, &actor, mode))
}

pub(crate) async fn check_in_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<AdminRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    respond(
        StatusCode::OK,
        service
            .check_in(&id, &request.actor())
            .map(|application| application.status_view()),
    )
}

pub(crate) async fn check_out_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<AdminRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    respond(
        StatusCode::OK,
        service
            .check_out(&id, &request.actor())
            .map(|application| application.status_view()),
    )
}

pub(crate) async fn checkout_request_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<StudentRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    respond(
        StatusCode::OK,
        service
            .request_checkout(
                &id,
                &request.student_id,
                request.reason.unwrap_or_default(),
                request.scheduled_for,
            )
            .map(|application| application.status_view()),
    )
}

pub(crate) async fn cancel_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<StudentRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    respond(
        StatusCode::OK,
        service
            .cancel(&id, &request.student_id, request.reason)
            .map(|application| application.status_view()),
    )
}

pub(crate) async fn eligibility_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(student_id): Path<String>,
    Query(query): Query<YearQuery>,
) -> Response {
    respond(
        StatusCode::OK,
        service.evaluate_eligibility(&StudentId(student_id), &query.academic_year),
    )
}

pub(crate) async fn search_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(student_id): Path<String>,
    Json(request): Json<SearchRequest>,
) -> Response {
    respond(
        StatusCode::OK,
        service.search_rooms(
            &StudentId(student_id),
            &request.academic_year,
            request.preferences,
        ),
    )
}

pub(crate) async fn self_select_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(student_id): Path<String>,
    Json(request): Json<SelfSelectRequest>,
) -> Response {
    respond(
        StatusCode::OK,
        service
            .self_select(&StudentId(student_id), &request.academic_year, request.room)
            .map(|application| application.status_view()),
    )
}

pub(crate) async fn expire_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(academic_year): Path<String>,
    Json(request): Json<AdminRequest>,
) -> Response {
    respond(
        StatusCode::OK,
        service.expire_year(&academic_year, &request.actor()),
    )
}

pub(crate) async fn batch_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(academic_year): Path<String>,
    Json(request): Json<AdminRequest>,
) -> Response {
    respond(
        StatusCode::OK,
        service.auto_assign_first_years(&academic_year, &request.actor()),
    )
}

pub(crate) async fn queue_handler(
    State(service): State<Arc<RegistrationService>>,
    Path(academic_year): Path<String>,
    Query(filter): Query<QueueFilter>,
) -> Response {
    respond(
        StatusCode::OK,
        service.priority_queue(&academic_year, &filter),
    )
}

pub(crate) async fn consistency_handler(
    State(service): State<Arc<RegistrationService>>,
) -> Response {
    respond(StatusCode::OK, service.check_consistency())
}

pub(crate) async fn repair_handler(
    State(service): State<Arc<RegistrationService>>,
    Json(request): Json<AdminRequest>,
) -> Response {
    respond(StatusCode::OK, service.repair_all(&request.actor()))
}
