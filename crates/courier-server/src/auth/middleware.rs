use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{Error, Result};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use courier_common::api::SESSION_COOKIE;
use tracing::debug;

/// Extract the session token from the `courier_session` cookie, falling
/// back to `Authorization: Bearer <token>`.
pub fn session_token(headers: &HeaderMap) -> Result<Option<String>> {
    for value in headers.get_all(header::COOKIE) {
        let raw = value.to_str().map_err(|_| Error::AuthFailTokenWrongFormat)?;
        let found = raw
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, token)| token.to_string());
        if let Some(token) = found {
            return Ok(Some(token));
        }
    }

    match headers.get(header::AUTHORIZATION) {
        Some(value) => {
            let value = value.to_str().map_err(|_| Error::AuthFailTokenWrongFormat)?;
            let token = value
                .strip_prefix("Bearer ")
                .ok_or(Error::AuthFailTokenWrongFormat)?;
            Ok(Some(token.to_string()))
        }
        None => Ok(None),
    }
}

pub async fn mw_require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    debug!("MIDDLEWARE: require_auth");

    let token = session_token(req.headers())?.ok_or(Error::AuthFailNoToken)?;

    let identity = state
        .auth
        .authenticate(&token)
        .await
        .ok_or(Error::AuthFailInvalidToken)?;

    req.extensions_mut().insert(Ctx::new(identity));

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; courier_session=abc123"),
        );
        assert_eq!(session_token(&headers).unwrap().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_bearer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).unwrap().as_deref(), Some("xyz"));
    }

    #[test]
    fn test_malformed_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert!(matches!(
            session_token(&headers),
            Err(Error::AuthFailTokenWrongFormat)
        ));
    }

    #[test]
    fn test_no_token() {
        assert!(session_token(&HeaderMap::new()).unwrap().is_none());
    }
}
