// Copyright 2023 Remi Bernotavicius

//! The REST API. Handlers are thin: they pull the viewer and inputs out of the
//! request, then hand a closure to [`AppState::run`] which executes it against
//! a pooled connection on the blocking thread pool.

use crate::database;
use crate::media::MediaStore;
use crate::Result;
use axum::Router;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tower_http::services::ServeDir;

mod catalog;
mod extract;
mod recipes;
mod users;

#[derive(Clone)]
pub struct AppState {
    pub pool: database::Pool,
    pub media: Arc<MediaStore>,
    pub page_size: i64,
}

impl AppState {
    pub fn new(pool: database::Pool, media: MediaStore, page_size: i64) -> Self {
        Self {
            pool,
            media: Arc::new(media),
            page_size,
        }
    }

    /// Runs `f` on the blocking pool with its own connection.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut database::Connection, &MediaStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let media = self.media.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn, &media)
        })
        .await?
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(catalog::routes())
        .merge(recipes::routes())
        .merge(users::routes());

    let mut app = Router::new().nest("/api", api);

    let media_url = state.media.base_url().trim_end_matches('/');
    if media_url.starts_with('/') && !media_url.is_empty() {
        app = app.nest_service(media_url, ServeDir::new(state.media.root()));
    }

    app.with_state(state)
}

pub async fn serve(state: AppState, address: SocketAddr) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!("listening on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down");
        } else {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt as _;
    use tower::ServiceExt as _;

    pub struct TestApp {
        pub state: AppState,
        pub media_dir: tempfile::TempDir,
    }

    impl TestApp {
        pub fn new() -> Self {
            let media_dir = tempfile::tempdir().unwrap();
            let state = AppState::new(
                database::test_pool(),
                MediaStore::new(media_dir.path(), "/media/"),
                6,
            );
            Self { state, media_dir }
        }

        pub async fn request(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            let (status, bytes) = self.request_raw(method, uri, token, body).await;
            let json = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        pub async fn request_raw(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, Vec<u8>) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Token {token}"));
            }
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = router(self.state.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            (status, bytes.to_vec())
        }

        /// Registers a user and logs them in, returning the token.
        pub async fn sign_up(&self, name: &str) -> (i64, String) {
            let (status, user) = self
                .request(
                    Method::POST,
                    "/api/users/",
                    None,
                    Some(serde_json::json!({
                        "email": format!("{name}@example.com"),
                        "username": name,
                        "first_name": "Test",
                        "last_name": name,
                        "password": format!("{name}-secret"),
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{user}");
            let (status, login) = self
                .request(
                    Method::POST,
                    "/api/auth/token/login/",
                    None,
                    Some(serde_json::json!({
                        "email": format!("{name}@example.com"),
                        "password": format!("{name}-secret"),
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{login}");
            (
                user["id"].as_i64().unwrap(),
                login["auth_token"].as_str().unwrap().to_owned(),
            )
        }
    }
}

#[tokio::test]
async fn media_is_served() {
    use axum::http::{Method, StatusCode};

    let app = testing::TestApp::new();
    let dir = app.media_dir.path().join("recipes/images");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("x.png"), crate::media::TEST_PNG).unwrap();

    let (status, body) = app
        .request_raw(Method::GET, "/media/recipes/images/x.png", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, crate::media::TEST_PNG);

    let (status, _) = app
        .request_raw(Method::GET, "/media/recipes/images/missing.png", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
