//! Actor identity middleware
//!
//! The upstream gateway authenticates the caller and forwards the verified
//! identity as headers. This layer only parses them into an [`Actor`] stored
//! in request extensions; handlers take it with `Extension<Actor>`.

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};

use super::common::ApiResponse;
use crate::domain::{Actor, ActorRole};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const REQUEST_TIMESTAMP_HEADER: &str = "x-request-timestamp";

/// Why the actor headers were rejected
#[derive(Debug, PartialEq, Eq)]
pub enum ActorHeaderError {
    MissingId,
    MissingRole,
    UnknownRole(String),
    BadTimestamp(String),
}

impl ActorHeaderError {
    fn message(&self) -> String {
        match self {
            Self::MissingId => format!("Missing {} header", ACTOR_ID_HEADER),
            Self::MissingRole => format!("Missing {} header", ACTOR_ROLE_HEADER),
            Self::UnknownRole(role) => format!("Unknown actor role '{}'", role),
            Self::BadTimestamp(ts) => format!("Invalid request timestamp '{}'", ts),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Builds the actor from gateway headers. The timestamp is optional and
/// defaults to the time the request was received.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ActorHeaderError> {
    let id = header(headers, ACTOR_ID_HEADER).ok_or(ActorHeaderError::MissingId)?;
    let role = header(headers, ACTOR_ROLE_HEADER).ok_or(ActorHeaderError::MissingRole)?;
    let role = ActorRole::parse(role).ok_or_else(|| ActorHeaderError::UnknownRole(role.to_string()))?;
    let requested_at = match header(headers, REQUEST_TIMESTAMP_HEADER) {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map_err(|_| ActorHeaderError::BadTimestamp(ts.to_string()))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    Ok(Actor::new(id, role, requested_at))
}

/// Rejects requests without a usable actor with 401
pub async fn actor_middleware(mut request: Request<Body>, next: Next) -> Response {
    match actor_from_headers(request.headers()) {
        Ok(actor) => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(e.message())),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn parses_full_header_set() {
        let actor = actor_from_headers(&headers(&[
            (ACTOR_ID_HEADER, "U1"),
            (ACTOR_ROLE_HEADER, "user"),
            (REQUEST_TIMESTAMP_HEADER, "2025-03-01T10:00:00Z"),
        ]))
        .unwrap();
        assert_eq!(actor.id, "U1");
        assert_eq!(actor.role, ActorRole::User);
        assert_eq!(actor.requested_at.to_rfc3339(), "2025-03-01T10:00:00+00:00");
    }

    #[test]
    fn rejects_missing_or_bad_headers() {
        assert_eq!(
            actor_from_headers(&headers(&[(ACTOR_ROLE_HEADER, "admin")])),
            Err(ActorHeaderError::MissingId)
        );
        assert_eq!(
            actor_from_headers(&headers(&[(ACTOR_ID_HEADER, "U1")])),
            Err(ActorHeaderError::MissingRole)
        );
        assert!(matches!(
            actor_from_headers(&headers(&[(ACTOR_ID_HEADER, "U1"), (ACTOR_ROLE_HEADER, "root")])),
            Err(ActorHeaderError::UnknownRole(_))
        ));
        assert!(matches!(
            actor_from_headers(&headers(&[
                (ACTOR_ID_HEADER, "U1"),
                (ACTOR_ROLE_HEADER, "user"),
                (REQUEST_TIMESTAMP_HEADER, "yesterday"),
            ])),
            Err(ActorHeaderError::BadTimestamp(_))
        ));
    }
}
