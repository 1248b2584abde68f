//! Caller identity
//!
//! Handlers read a [`SessionUser`] from the request extensions. Something in
//! front of them has to put it there: either the embedding application, or
//! [`identity_from_headers`], which trusts headers set by a session proxy.

use crate::assistant::SessionUser;
use crate::server::error::ApiError;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Names of the trusted identity headers
#[derive(Debug, Clone)]
pub struct IdentityHeaders {
    pub user_id: String,
    pub username: String,
}

impl Default for IdentityHeaders {
    fn default() -> Self {
        Self {
            user_id: "x-user-id".to_string(),
            username: "x-username".to_string(),
        }
    }
}

impl IdentityHeaders {
    /// Read an identity from request headers; a blank user id means none
    pub fn extract(&self, headers: &HeaderMap) -> Option<SessionUser> {
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let user_id = value(&self.user_id)?;
        Some(SessionUser::new(user_id, value(&self.username)))
    }
}

/// Middleware that attaches a [`SessionUser`] built from trusted headers
///
/// An identity already present in the extensions is left alone.
pub async fn identity_from_headers(
    State(headers): State<IdentityHeaders>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<SessionUser>().is_none() {
        if let Some(user) = headers.extract(request.headers()) {
            request.extensions_mut().insert(user);
        }
    }
    next.run(request).await
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionUser>()
            .cloned()
            .ok_or_else(ApiError::unauthorized)
    }
}
