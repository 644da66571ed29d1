use axum::{
	Json, Router,
	extract::{State, rejection::JsonRejection},
	http::{HeaderMap, StatusCode, header::AUTHORIZATION},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;

use kb_service::{SearchRequest, SearchResponse, StaticIdentity};

use crate::state::AppState;

/// Header carrying the authenticated user id, set by the fronting gateway.
pub const USER_ID_HEADER: &str = "x-kb-user-id";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	headers: HeaderMap,
	payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
	authorize(&state, &headers)?;

	let payload = match payload {
		Ok(Json(payload)) => payload,
		Err(rejection) => {
			tracing::debug!(error = %rejection, "Rejected search request body.");

			let body = SearchResponse::failure(format!("Invalid request: {}", rejection.body_text()));

			return Ok((rejection.status(), Json(body)).into_response());
		},
	};
	let identity = identity_from_headers(&headers);
	let response = state.service.search(&identity, payload).await;

	Ok(Json(response).into_response())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
	let Some(expected) = state.service.cfg.security.api_auth_token.as_deref() else {
		return Ok(());
	};
	let presented = headers
		.get(AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "))
		.map(str::trim);

	if presented == Some(expected) {
		return Ok(());
	}

	Err(ApiError::new(
		StatusCode::UNAUTHORIZED,
		"unauthorized",
		"Missing or invalid bearer token.",
	))
}

fn identity_from_headers(headers: &HeaderMap) -> StaticIdentity {
	match headers.get(USER_ID_HEADER).and_then(|value| value.to_str().ok()) {
		Some(user_id) if !user_id.trim().is_empty() => StaticIdentity::new(user_id.trim()),
		_ => StaticIdentity::anonymous(),
	}
}

#[derive(Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
