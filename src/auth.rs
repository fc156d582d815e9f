#![allow(dead_code)]
use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    RequestPartsExt,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;

#[derive(Clone)]
pub struct AuthConfig {
    pub token: String,
}

/// Create an authentication middleware layer
///
/// This returns a middleware layer that checks for Bearer token authentication
pub fn auth_layer(token: String) -> impl Clone {
    middleware::from_fn::<_, Response>(move |mut req: Request<Body>, next: Next| {
        let token = token.clone();
        async move {
            let (mut parts, body) = req.into_parts();
            let bearer = parts
                .extract::<TypedHeader<Authorization<Bearer>>>()
                .await
                .map_err(|_| StatusCode::UNAUTHORIZED)?;
            req = Request::from_parts(parts, body);

            if bearer.token() == token {
                Ok::<_, StatusCode>(next.run(req).await)
            } else {
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    })
}

#[derive(Debug, Clone)]
pub struct AuthBearer(pub uuid::Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = StatusCode;
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map(|_| Self(uuid::Uuid::new_v4()))
            .map_err(|_| StatusCode::UNAUTHORIZED)
    }
}
