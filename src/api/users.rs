// Copyright 2023 Remi Bernotavicius

use super::extract::{ApiJson, ApiPath, CurrentUser, QueryPairs, Viewer};
use super::AppState;
use crate::database::models::UserId;
use crate::pagination::{LimitOffset, Page};
use crate::subscriptions::{self, SubscriptionView};
use crate::users::{self, CreatedUser, Credentials, PasswordChange, Registration, UserView};
use crate::{Error, Result};
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list_users).post(register))
        .route("/users/me/", get(me))
        .route("/users/set_password/", post(set_password))
        .route("/users/subscriptions/", get(list_subscriptions))
        .route("/users/{id}/", get(get_user))
        .route("/users/{id}/subscribe/", post(subscribe).delete(unsubscribe))
        .route("/auth/token/login/", post(login))
        .route("/auth/token/logout/", post(logout))
}

fn recipes_limit(query: &QueryPairs) -> Result<Option<i64>> {
    query
        .first("recipes_limit")
        .map(|value| match value.trim().parse::<i64>() {
            Ok(n) if n >= 0 => Ok(n),
            _ => Err(Error::validation(
                "recipes_limit: expected a non-negative integer",
            )),
        })
        .transpose()
}

async fn list_users(
    State(state): State<AppState>,
    viewer: Viewer,
    OriginalUri(uri): OriginalUri,
    query: QueryPairs,
) -> Result<Json<Page<UserView>>> {
    let page = LimitOffset::from_params(query.first("limit"), query.first("offset"), state.page_size)?;
    let viewer = viewer.id();
    let (count, results) = state
        .run(move |conn, _| users::list(conn, viewer, page.limit, page.offset))
        .await?;
    Ok(Json(page.page(uri.path(), &query.0, count, results)))
}

async fn register(
    State(state): State<AppState>,
    _: Viewer,
    ApiJson(registration): ApiJson<Registration>,
) -> Result<(StatusCode, Json<CreatedUser>)> {
    let user = state
        .run(move |conn, _| users::register(conn, &registration))
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn me(current: CurrentUser) -> Json<UserView> {
    Json(UserView::new(current.user, false))
}

async fn get_user(
    State(state): State<AppState>,
    viewer: Viewer,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<UserView>> {
    let viewer = viewer.id();
    let view = state
        .run(move |conn, _| {
            let user = users::get(conn, id)?;
            users::view(conn, viewer, user)
        })
        .await?;
    Ok(Json(view))
}

async fn set_password(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(change): ApiJson<PasswordChange>,
) -> Result<Json<Value>> {
    let user = current.user.id;
    state
        .run(move |conn, _| users::set_password(conn, user, &change))
        .await?;
    Ok(Json(json!({"detail": "password changed"})))
}

async fn subscribe(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(author): ApiPath<UserId>,
    query: QueryPairs,
) -> Result<(StatusCode, Json<SubscriptionView>)> {
    let limit = recipes_limit(&query)?;
    let user = current.user.id;
    let view = state
        .run(move |conn, media| subscriptions::subscribe(conn, media, user, author, limit))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn unsubscribe(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(author): ApiPath<UserId>,
) -> Result<StatusCode> {
    let user = current.user.id;
    state
        .run(move |conn, _| subscriptions::unsubscribe(conn, user, author))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_subscriptions(
    State(state): State<AppState>,
    current: CurrentUser,
    OriginalUri(uri): OriginalUri,
    query: QueryPairs,
) -> Result<Json<Page<SubscriptionView>>> {
    let page = LimitOffset::from_params(query.first("limit"), query.first("offset"), state.page_size)?;
    let limit = recipes_limit(&query)?;
    let user = current.user.id;
    let (count, results) = state
        .run(move |conn, media| subscriptions::list(conn, media, user, page, limit))
        .await?;
    Ok(Json(page.page(uri.path(), &query.0, count, results)))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<Json<Value>> {
    let token = state
        .run(move |conn, _| users::login(conn, &credentials))
        .await?;
    Ok(Json(json!({ "auth_token": token })))
}

async fn logout(State(state): State<AppState>, current: CurrentUser) -> Result<StatusCode> {
    state
        .run(move |conn, _| users::logout(conn, &current.token))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
use super::testing::TestApp;
#[cfg(test)]
use axum::http::Method;

#[tokio::test]
async fn registration_and_tokens() {
    let app = TestApp::new();
    let (id, token) = app.sign_up("alice").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/users/",
            None,
            Some(json!({
                "email": "alice@example.com",
                "username": "alice2",
                "first_name": "A",
                "last_name": "B",
                "password": "pw",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, me) = app.request(Method::GET, "/api/users/me/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], id);
    assert_eq!(me["username"], "alice");
    assert_eq!(me["is_subscribed"], false);
    assert!(me.get("password").is_none());

    let (status, _) = app.request(Method::GET, "/api/users/me/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/token/login/",
            None,
            Some(json!({"email": "alice@example.com", "password": "wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(Method::POST, "/api/auth/token/logout/", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.request(Method::GET, "/api/users/me/", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    // a stale token is rejected on public endpoints too
    let (status, _) = app.request(Method::GET, "/api/users/", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_change() {
    let app = TestApp::new();
    let (_, token) = app.sign_up("bob").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/users/set_password/",
            Some(&token),
            Some(json!({"current_password": "nope", "new_password": "fresh-secret"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/users/set_password/",
            Some(&token),
            Some(json!({"current_password": "bob-secret", "new_password": "fresh-secret"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/token/login/",
            None,
            Some(json!({"email": "bob@example.com", "password": "fresh-secret"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn subscriptions_flow() {
    let app = TestApp::new();
    let (author_id, _) = app.sign_up("author").await;
    let (reader_id, reader) = app.sign_up("reader").await;

    let own = format!("/api/users/{reader_id}/subscribe/");
    let (status, _) = app.request(Method::POST, &own, Some(&reader), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(Method::POST, "/api/users/999/subscribe/", Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let subscribe = format!("/api/users/{author_id}/subscribe/?recipes_limit=1");
    let (status, view) = app.request(Method::POST, &subscribe, Some(&reader), None).await;
    assert_eq!(status, StatusCode::CREATED, "{view}");
    assert_eq!(view["id"], author_id);
    assert_eq!(view["is_subscribed"], true);
    assert_eq!(view["recipes_count"], 0);
    let (status, _) = app.request(Method::POST, &subscribe, Some(&reader), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, page) = app
        .request(
            Method::GET,
            "/api/users/subscriptions/?limit=5",
            Some(&reader),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["username"], "author");

    let uri = format!("/api/users/{author_id}/");
    let (_, author) = app.request(Method::GET, &uri, Some(&reader), None).await;
    assert_eq!(author["is_subscribed"], true);
    let (_, author) = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(author["is_subscribed"], false);

    let (status, users) = app
        .request(Method::GET, "/api/users/?limit=1", Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users["count"], 2);
    assert_eq!(users["next"], "/api/users/?limit=1&offset=1");

    let (status, users) = app
        .request(
            Method::GET,
            "/api/users/?limit=9223372036854775807&offset=1",
            Some(&reader),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{users}");
    assert_eq!(users["results"].as_array().map(Vec::len), Some(1));
    assert_eq!(users["next"], Value::Null);

    let unsubscribe = format!("/api/users/{author_id}/subscribe/");
    let (status, _) = app
        .request(Method::DELETE, &unsubscribe, Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .request(Method::DELETE, &unsubscribe, Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::GET,
            "/api/users/subscriptions/?recipes_limit=-1",
            Some(&reader),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
