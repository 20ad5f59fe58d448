//! Access token authentication middleware.

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::TokenSigner;
use crate::web::error::ApiError;

/// Extractor for authenticated users.
///
/// Use this extractor to require a valid access token for a handler.
/// The handler receives the verified claims.
#[derive(Debug, Clone)]
pub struct AuthUser(pub crate::auth::Claims);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let token = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|header| header.strip_prefix("Bearer "))
                .ok_or_else(|| ApiError::unauthorized("Missing authorization"))?;

            // Signer is injected into extensions by the router middleware
            let signer = parts
                .extensions
                .get::<Arc<TokenSigner>>()
                .ok_or_else(|| ApiError::internal("Token signer not configured"))?;

            let claims = signer
                .verify(token)
                .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

            Ok(AuthUser(claims))
        })
    }
}

/// Middleware function to inject the token signer into request extensions.
pub async fn inject_signer(
    signer: Arc<TokenSigner>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(signer);
    next.run(request).await
}
