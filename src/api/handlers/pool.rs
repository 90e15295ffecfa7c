//! Pool handlers: list, create, describe, join, close session.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::api::dto::{PoolDto, PoolListResponse, PoolNameDto};
use crate::app_state::AppState;
use crate::domain::{Pool, PoolName, SessionId};
use crate::error::{ErrorResponse, RelayError};
use crate::transport::{SdpType, SessionDescription};

/// `GET /pools` — List pool names.
#[utoipa::path(
    get,
    path = "/pools",
    tag = "Pools",
    summary = "List pools",
    description = "Returns the names of all registered pools.",
    responses(
        (status = 200, description = "Pool list", body = PoolListResponse),
    )
)]
pub async fn list_pools(State(state): State<AppState>) -> impl IntoResponse {
    let mut names = state.manager.pools().await;
    names.sort();
    Json(PoolListResponse {
        pools: names
            .into_iter()
            .map(|name| PoolNameDto { name: name.into() })
            .collect(),
    })
}

/// `PUT /pool/{name}` — Create a pool.
///
/// # Errors
///
/// Returns [`RelayError::DuplicateName`] if the name is taken.
#[utoipa::path(
    put,
    path = "/pool/{name}",
    tag = "Pools",
    summary = "Create a pool",
    description = "Registers a new, empty pool with the relay's default connection configuration.",
    params(
        ("name" = String, Path, description = "Pool name"),
    ),
    responses(
        (status = 200, description = "Pool created", body = PoolDto),
        (status = 500, description = "Pool already exists", body = ErrorResponse),
    )
)]
pub async fn create_pool(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let pool = state
        .manager
        .new_pool(PoolName::from(name))
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "couldn't create pool"))?;
    Ok(Json(describe(&pool).await))
}

/// `GET /pool/{name}` — Pool details.
///
/// # Errors
///
/// Returns [`RelayError::PoolNotFound`] if the pool does not exist.
#[utoipa::path(
    get,
    path = "/pool/{name}",
    tag = "Pools",
    summary = "Get pool details",
    description = "Returns the pool descriptor including its current session count.",
    params(
        ("name" = String, Path, description = "Pool name"),
    ),
    responses(
        (status = 200, description = "Pool details", body = PoolDto),
        (status = 500, description = "Pool not found", body = ErrorResponse),
    )
)]
pub async fn get_pool(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let pool = state.manager.pool(&name).await?;
    Ok(Json(describe(&pool).await))
}

/// `POST /pool/{name}/join/{id}` — Join a pool with a connection offer.
///
/// The body is the base64-encoded offer: raw SDP text or a JSON
/// `{ "type": "offer", "sdp": ... }` descriptor.
///
/// # Errors
///
/// - [`RelayError::PoolNotFound`] if the pool does not exist.
/// - [`RelayError::BadInput`] on malformed base64 or an oversized offer.
/// - [`RelayError::BadOffer`] if the offer is rejected.
/// - [`RelayError::SessionExists`] if `id` is already in the pool.
/// - [`RelayError::TransportFailure`] if the connection cannot be built.
#[utoipa::path(
    post,
    path = "/pool/{name}/join/{id}",
    tag = "Sessions",
    summary = "Join a pool",
    description = "Negotiates a peer connection from a base64-encoded offer and registers \
                   the session under `id`.",
    params(
        ("name" = String, Path, description = "Pool name"),
        ("id" = String, Path, description = "Session identifier, unique within the pool"),
    ),
    request_body(
        content = String,
        description = "Base64-encoded connection offer",
        content_type = "text/plain"
    ),
    responses(
        (status = 200, description = "Connection answer", body = SessionDescription),
        (status = 400, description = "Malformed or oversized offer", body = ErrorResponse),
        (status = 409, description = "Session id already in use", body = ErrorResponse),
        (status = 500, description = "Pool not found or transport failure", body = ErrorResponse),
    )
)]
pub async fn join_pool(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, RelayError> {
    tracing::debug!(pool = %name, session = %id, "join request");
    let pool = state
        .manager
        .pool(&name)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "couldn't join pool"))?;

    let offer = decode_offer(&body, state.max_offer_bytes)
        .inspect_err(|e| tracing::debug!(pool = %name, error = %e, "invalid offer body"))?;

    let answer = pool
        .new_session(offer, SessionId::from(id))
        .await
        .inspect_err(|e| tracing::debug!(pool = %name, error = %e, "error creating session"))?;
    Ok(Json(answer))
}

/// `DELETE /pool/{name}/session/{id}` — Close a session.
///
/// # Errors
///
/// - [`RelayError::PoolNotFound`] if the pool does not exist.
/// - [`RelayError::SessionNotFound`] if the session does not exist.
/// - [`RelayError::TransportFailure`] if closing the connection fails.
#[utoipa::path(
    delete,
    path = "/pool/{name}/session/{id}",
    tag = "Sessions",
    summary = "Close a session",
    description = "Removes the session from the pool and closes its peer connection.",
    params(
        ("name" = String, Path, description = "Pool name"),
        ("id" = String, Path, description = "Session identifier"),
    ),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Pool not found or close failed", body = ErrorResponse),
    )
)]
pub async fn close_session(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, RelayError> {
    let pool = state.manager.pool(&name).await?;
    pool.close_session(&SessionId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pool and session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pools", get(list_pools))
        .route("/pool/{name}", get(get_pool).put(create_pool))
        .route("/pool/{name}/join/{id}", post(join_pool))
        .route("/pool/{name}/session/{id}", delete(close_session))
}

async fn describe(pool: &Pool) -> PoolDto {
    PoolDto {
        name: pool.name().to_string(),
        sessions: pool.session_count().await,
        created_at: pool.created_at(),
    }
}

// ── Offer Decoding ──────────────────────────────────────────────────────

/// Decodes a base64 request body into an offer of at most `max_len`
/// decoded bytes.
///
/// # Errors
///
/// Returns [`RelayError::BadInput`] for empty, oversized or non-base64
/// bodies and [`RelayError::BadOffer`] for content that is not an offer.
fn decode_offer(body: &[u8], max_len: usize) -> Result<SessionDescription, RelayError> {
    let encoded: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if encoded.is_empty() {
        return Err(RelayError::BadInput("empty offer".to_string()));
    }
    let max_encoded = base64::encoded_len(max_len, true).unwrap_or(usize::MAX);
    if encoded.len() > max_encoded {
        return Err(RelayError::BadInput(format!(
            "offer exceeds {max_len} bytes"
        )));
    }

    let decoded = STANDARD
        .decode(&encoded)
        .map_err(|e| RelayError::BadInput(format!("invalid base64: {e}")))?;
    if decoded.len() > max_len {
        return Err(RelayError::BadInput(format!(
            "offer exceeds {max_len} bytes"
        )));
    }

    let text = String::from_utf8(decoded)
        .map_err(|_| RelayError::BadOffer("offer is not valid UTF-8".to_string()))?;

    if text.trim_start().starts_with('{') {
        let desc: SessionDescription = serde_json::from_str(&text)
            .map_err(|e| RelayError::BadOffer(format!("invalid offer descriptor: {e}")))?;
        if desc.sdp_type != SdpType::Offer {
            return Err(RelayError::BadOffer(
                "descriptor type must be offer".to_string(),
            ));
        }
        return Ok(desc);
    }
    Ok(SessionDescription::offer(text))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn encode(s: &str) -> Vec<u8> {
        STANDARD.encode(s).into_bytes()
    }

    #[test]
    fn decodes_raw_sdp() {
        let Ok(offer) = decode_offer(&encode("v=0\r\n"), 1024) else {
            panic!("decode failed");
        };
        assert_eq!(offer, SessionDescription::offer("v=0\r\n"));
    }

    #[test]
    fn decodes_json_descriptor() {
        let body = encode(r#"{"type":"offer","sdp":"v=0"}"#);
        let Ok(offer) = decode_offer(&body, 1024) else {
            panic!("decode failed");
        };
        assert_eq!(offer.sdp, "v=0");
    }

    #[test]
    fn rejects_answer_descriptor() {
        let body = encode(r#"{"type":"answer","sdp":"v=0"}"#);
        assert!(matches!(
            decode_offer(&body, 1024),
            Err(RelayError::BadOffer(_))
        ));
    }

    #[test]
    fn tolerates_line_wrapped_base64() {
        let mut body = encode("v=0\r\ns=wrapped\r\n");
        body.insert(4, b'\n');
        body.push(b'\n');
        assert!(decode_offer(&body, 1024).is_ok());
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            decode_offer(b"!!!not-base64!!!", 1024),
            Err(RelayError::BadInput(_))
        ));
    }

    #[test]
    fn rejects_empty_body() {
        assert!(matches!(
            decode_offer(b"  \n", 1024),
            Err(RelayError::BadInput(_))
        ));
    }

    #[test]
    fn rejects_oversized_offer() {
        let big = "v=0".repeat(100);
        assert!(matches!(
            decode_offer(&encode(&big), 64),
            Err(RelayError::BadInput(_))
        ));
        assert!(decode_offer(&encode(&big), 300).is_ok());
    }

    #[test]
    fn rejects_non_utf8() {
        let body = STANDARD.encode([0xff_u8, 0xfe, 0xfd]).into_bytes();
        assert!(matches!(
            decode_offer(&body, 1024),
            Err(RelayError::BadOffer(_))
        ));
    }
}
