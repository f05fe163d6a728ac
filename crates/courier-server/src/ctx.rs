use crate::error::{Error, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use courier_common::Identity;

/// Authenticated caller, inserted into request extensions by
/// [`crate::auth::mw_require_auth`].
#[derive(Clone, Debug)]
pub struct Ctx {
    identity: Identity,
}

impl Ctx {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or(Error::AuthFailCtxNotInRequestExt)
    }
}
