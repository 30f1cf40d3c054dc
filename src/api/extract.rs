// Copyright 2023 Remi Bernotavicius

//! Request extractors. Every rejection is turned into the crate's [`Error`] so
//! clients see the same `{"errors": ...}` body for all failures.

use super::AppState;
use crate::database::models::{User, UserId};
use crate::users;
use crate::Error;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::{header, request::Parts};
use axum::Json;
use serde::de::DeserializeOwned;

/// The key from an `Authorization: Token <key>` header, if one was sent.
fn token_key(parts: &Parts) -> Result<Option<String>, Error> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| Error::InvalidToken)?;
    match value.trim().split_once(' ') {
        Some(("Token", key)) if !key.trim().is_empty() => Ok(Some(key.trim().to_owned())),
        _ => Err(Error::InvalidToken),
    }
}

async fn authenticate(state: &AppState, key: String) -> Result<User, Error> {
    state
        .run(move |conn, _| users::authenticate(conn, &key))
        .await
}

/// Whoever is asking, possibly nobody. A token that is sent but not valid is
/// still rejected.
pub struct Viewer(pub Option<User>);

impl Viewer {
    pub fn id(&self) -> Option<UserId> {
        self.0.as_ref().map(|u| u.id)
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Error> {
        match token_key(parts)? {
            Some(key) => Ok(Self(Some(authenticate(state, key).await?))),
            None => Ok(Self(None)),
        }
    }
}

/// An authenticated user, along with the token they presented.
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Error> {
        let token = token_key(parts)?.ok_or(Error::Unauthenticated)?;
        let user = authenticate(state, token.clone()).await?;
        Ok(Self { user, token })
    }
}

/// `Json` with malformed bodies reported as validation errors.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Error> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| Error::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Path parameters; anything that doesn't parse names no resource.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Error> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|_| Error::NotFound("resource"))?;
        Ok(Self(value))
    }
}

/// The raw query string as ordered pairs; keys may repeat.
pub struct QueryPairs(pub Vec<(String, String)>);

impl QueryPairs {
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl<S> FromRequestParts<S> for QueryPairs
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Error> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| Error::validation(rejection.body_text()))?;
        Ok(Self(pairs))
    }
}

#[cfg(test)]
fn parts_with(authorization: Option<&str>) -> Parts {
    let mut builder = axum::http::Request::builder().uri("/api/recipes/?tags=a&tags=b&page=2");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(()).unwrap().into_parts().0
}

#[test]
fn token_header_parsing() {
    assert_eq!(token_key(&parts_with(None)).unwrap(), None);
    assert_eq!(
        token_key(&parts_with(Some("Token abc123"))).unwrap().as_deref(),
        Some("abc123")
    );
    assert!(matches!(
        token_key(&parts_with(Some("Bearer abc123"))),
        Err(Error::InvalidToken)
    ));
    assert!(matches!(
        token_key(&parts_with(Some("Token "))),
        Err(Error::InvalidToken)
    ));
}

#[tokio::test]
async fn query_pairs_keep_repeats() {
    let mut parts = parts_with(None);
    let QueryPairs(pairs) = QueryPairs::from_request_parts(&mut parts, &()).await.unwrap();
    assert_eq!(
        pairs,
        vec![
            ("tags".to_owned(), "a".to_owned()),
            ("tags".to_owned(), "b".to_owned()),
            ("page".to_owned(), "2".to_owned()),
        ]
    );
}
