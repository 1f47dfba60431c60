//! HTTP Basic credentials extractor.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use broker_core::AuthPrincipal;

/// The request's basic-auth principal, if it carried a well-formed one.
///
/// Never rejects: a missing or malformed header yields `None`, and the
/// controller decides whether the operation needs a principal.
pub(crate) struct BasicAuth(pub(crate) Option<AuthPrincipal>);

impl<S> FromRequestParts<S> for BasicAuth
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_basic);
        Ok(BasicAuth(principal))
    }
}

/// Parse an `Authorization: Basic <base64(user:password)>` value.
pub(crate) fn parse_basic(header: &str) -> Option<AuthPrincipal> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(AuthPrincipal {
        username: username.to_string(),
        password: password.to_string(),
    })
}
