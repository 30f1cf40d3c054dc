// Copyright 2023 Remi Bernotavicius

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::DatabaseErrorKind;
use log::error;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("authentication credentials were not provided")]
    Unauthenticated,

    #[error("invalid token")]
    InvalidToken,

    #[error("you do not have permission to perform this action")]
    Forbidden,

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("migration error: {0}")]
    Migration(Box<dyn std::error::Error + Send + Sync>),

    #[error("password hashing error: {0}")]
    PasswordHash(argon2::password_hash::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to initialize logging: {0}")]
    Logger(#[from] log::SetLoggerError),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn required(field: &str) -> Self {
        Self::Validation(format!("{field}: this field is required"))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Database(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::CheckViolation,
                _,
            )) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<argon2::password_hash::Error> for Error {
    fn from(e: argon2::password_hash::Error) -> Self {
        Self::PasswordHash(e)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("request failed: {self}");
            "internal server error".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "errors": message }))).into_response()
    }
}

#[test]
fn constraint_violations_are_client_errors() {
    struct Info;
    impl diesel::result::DatabaseErrorInformation for Info {
        fn message(&self) -> &str {
            "UNIQUE constraint failed: favorites.user_id, favorites.recipe_id"
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            None
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            None
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    let e = Error::from(diesel::result::Error::DatabaseError(
        DatabaseErrorKind::UniqueViolation,
        Box::new(Info),
    ));
    assert_eq!(e.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        Error::from(diesel::result::Error::NotFound).status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(Error::NotFound("recipe").status(), StatusCode::NOT_FOUND);
    assert_eq!(Error::InvalidToken.status(), StatusCode::UNAUTHORIZED);
}
