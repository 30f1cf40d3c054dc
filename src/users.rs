// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{AuthToken, NewUser, User, UserId};
use crate::{Error, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::Argon2;
use diesel::prelude::OptionalExtension as _;
use diesel::BoolExpressionMethods as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use log::info;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const MAX_NAME_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 254;

/// A user as seen by some viewer.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub email: String,
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn new(user: User, is_subscribed: bool) -> Self {
        Self {
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed,
        }
    }
}

/// Returned from registration; never carries the password.
#[derive(Serialize, Debug)]
pub struct CreatedUser {
    pub email: String,
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for CreatedUser {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct Registration {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

fn required<'a>(field: &str, value: &'a Option<String>, max_len: usize) -> Result<&'a str> {
    let value = value.as_deref().map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(Error::required(field));
    }
    if value.chars().count() > max_len {
        return Err(Error::validation(format!(
            "{field}: must be at most {max_len} characters"
        )));
    }
    Ok(value)
}

fn valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '@' | '+' | '-' | '_'))
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !email.contains(' ')
        }
        None => false,
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Argon2 compares the derived digests in constant time.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub fn register(conn: &mut database::Connection, registration: &Registration) -> Result<User> {
    use database::schema::users::dsl::*;

    let new_email = required("email", &registration.email, MAX_EMAIL_LENGTH)?;
    let new_username = required("username", &registration.username, MAX_NAME_LENGTH)?;
    let new_first_name = required("first_name", &registration.first_name, MAX_NAME_LENGTH)?;
    let new_last_name = required("last_name", &registration.last_name, MAX_NAME_LENGTH)?;
    let new_password = registration
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::required("password"))?;

    if !valid_email(new_email) {
        return Err(Error::validation("email: enter a valid email address"));
    }
    if !valid_username(new_username) {
        return Err(Error::validation(
            "username: may only contain letters, digits and .@+-_",
        ));
    }

    let taken: Vec<(String, String)> = users
        .select((email, username))
        .filter(email.eq(new_email).or(username.eq(new_username)))
        .load(conn)?;
    if taken.iter().any(|(e, _)| e == new_email) {
        return Err(Error::validation("email: a user with that email already exists"));
    }
    if !taken.is_empty() {
        return Err(Error::validation(
            "username: a user with that username already exists",
        ));
    }

    let hashed = hash_password(new_password)?;
    let user = diesel::insert_into(users)
        .values(NewUser {
            email: new_email,
            username: new_username,
            first_name: new_first_name,
            last_name: new_last_name,
            password: &hashed,
        })
        .returning(User::as_returning())
        .get_result(conn)?;

    info!("registered user {} ({})", user.username, user.id);
    Ok(user)
}

pub fn get(conn: &mut database::Connection, user_id: UserId) -> Result<User> {
    use database::schema::users::dsl::*;

    users
        .find(user_id)
        .select(User::as_select())
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound("user"))
}

/// The subset of `authors` the viewer is subscribed to.
pub fn subscribed_to(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    authors: &[UserId],
) -> Result<HashSet<UserId>> {
    use database::schema::subscriptions::dsl::*;

    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    Ok(subscriptions
        .select(subscribing_id)
        .filter(user_id.eq(viewer))
        .filter(subscribing_id.eq_any(authors.to_vec()))
        .load::<UserId>(conn)?
        .into_iter()
        .collect())
}

pub fn view(conn: &mut database::Connection, viewer: Option<UserId>, user: User) -> Result<UserView> {
    let subscribed = subscribed_to(conn, viewer, &[user.id])?;
    let is_subscribed = subscribed.contains(&user.id);
    Ok(UserView::new(user, is_subscribed))
}

pub fn list(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    limit: i64,
    offset: i64,
) -> Result<(i64, Vec<UserView>)> {
    use database::schema::users::dsl::*;

    let count: i64 = users.count().get_result(conn)?;
    let page: Vec<User> = users
        .select(User::as_select())
        .order(id)
        .limit(limit)
        .offset(offset)
        .load(conn)?;

    let ids: Vec<UserId> = page.iter().map(|u| u.id).collect();
    let subscribed = subscribed_to(conn, viewer, &ids)?;
    let views = page
        .into_iter()
        .map(|u| {
            let is_subscribed = subscribed.contains(&u.id);
            UserView::new(u, is_subscribed)
        })
        .collect();
    Ok((count, views))
}

#[derive(Deserialize, Default, Debug)]
pub struct PasswordChange {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

pub fn set_password(
    conn: &mut database::Connection,
    user_id: UserId,
    change: &PasswordChange,
) -> Result<()> {
    use database::schema::users::dsl::*;

    let (Some(current), Some(new)) = (
        change.current_password.as_deref().filter(|p| !p.is_empty()),
        change.new_password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(Error::validation(
            "current_password and new_password are both required",
        ));
    };

    let user = get(conn, user_id)?;
    if !verify_password(current, &user.password) {
        return Err(Error::validation("current_password: incorrect password"));
    }

    let hashed = hash_password(new)?;
    diesel::update(users.find(user_id))
        .set(password.eq(hashed))
        .execute(conn)?;

    info!("user {user_id} changed their password");
    Ok(())
}

fn generate_token_key() -> String {
    let mut bytes = [0u8; 20];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Deserialize, Default, Debug)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Exchanges credentials for a new token key.
pub fn login(conn: &mut database::Connection, credentials: &Credentials) -> Result<String> {
    let login_email = credentials.email.as_deref().unwrap_or_default().trim();
    let login_password = credentials.password.as_deref().unwrap_or_default();
    if login_email.is_empty() || login_password.is_empty() {
        return Err(Error::validation("email and password are both required"));
    }

    let user = {
        use database::schema::users::dsl::*;

        users
            .select(User::as_select())
            .filter(email.eq(login_email))
            .get_result(conn)
            .optional()?
    };
    let Some(user) = user.filter(|u| verify_password(login_password, &u.password)) else {
        return Err(Error::validation("unable to log in with provided credentials"));
    };

    issue_token(conn, user.id)
}

fn issue_token(conn: &mut database::Connection, owner: UserId) -> Result<String> {
    use database::schema::auth_tokens::dsl::*;

    let token = AuthToken {
        key: generate_token_key(),
        user_id: owner,
        created: chrono::Utc::now().naive_utc(),
    };
    diesel::insert_into(auth_tokens)
        .values(&token)
        .execute(conn)?;

    info!("issued token for user {owner}");
    Ok(token.key)
}

pub fn logout(conn: &mut database::Connection, token_key: &str) -> Result<()> {
    use database::schema::auth_tokens::dsl::*;

    diesel::delete(auth_tokens.filter(key.eq(token_key))).execute(conn)?;
    Ok(())
}

pub fn authenticate(conn: &mut database::Connection, token_key: &str) -> Result<User> {
    use database::schema::auth_tokens;
    use database::schema::users;

    auth_tokens::table
        .inner_join(users::table)
        .filter(auth_tokens::key.eq(token_key))
        .select(User::as_select())
        .get_result(conn)
        .optional()?
        .ok_or(Error::InvalidToken)
}

#[cfg(test)]
pub fn registration(name: &str) -> Registration {
    Registration {
        email: Some(format!("{name}@example.com")),
        username: Some(name.into()),
        first_name: Some(name.to_uppercase()),
        last_name: Some("Tester".into()),
        password: Some(format!("{name}-secret")),
    }
}

#[test]
fn register_and_login() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();

    let user = register(&mut conn, &registration("ivan")).unwrap();
    assert_eq!(user.username, "ivan");
    assert_ne!(user.password, "ivan-secret");

    let key = login(
        &mut conn,
        &Credentials {
            email: Some("ivan@example.com".into()),
            password: Some("ivan-secret".into()),
        },
    )
    .unwrap();
    assert_eq!(key.len(), 40);
    assert_eq!(authenticate(&mut conn, &key).unwrap().id, user.id);

    logout(&mut conn, &key).unwrap();
    assert!(matches!(
        authenticate(&mut conn, &key),
        Err(Error::InvalidToken)
    ));
}

#[test]
fn register_rejects_duplicates_and_bad_input() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    register(&mut conn, &registration("petr")).unwrap();

    let mut same_email = registration("other");
    same_email.email = Some("petr@example.com".into());
    assert!(matches!(
        register(&mut conn, &same_email),
        Err(Error::Validation(_))
    ));

    let mut same_username = registration("petr");
    same_username.email = Some("someone@example.com".into());
    assert!(matches!(
        register(&mut conn, &same_username),
        Err(Error::Validation(_))
    ));

    let mut missing = registration("sidr");
    missing.last_name = None;
    assert!(matches!(
        register(&mut conn, &missing),
        Err(Error::Validation(_))
    ));

    let mut bad_username = registration("sidr");
    bad_username.username = Some("sidr sidorov".into());
    assert!(register(&mut conn, &bad_username).is_err());

    let mut bad_email = registration("sidr");
    bad_email.email = Some("not-an-email".into());
    assert!(register(&mut conn, &bad_email).is_err());
}

#[test]
fn wrong_credentials_do_not_log_in() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    register(&mut conn, &registration("ivan")).unwrap();

    let result = login(
        &mut conn,
        &Credentials {
            email: Some("ivan@example.com".into()),
            password: Some("wrong".into()),
        },
    );
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn change_password() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    let user = register(&mut conn, &registration("ivan")).unwrap();

    let wrong = PasswordChange {
        current_password: Some("nope".into()),
        new_password: Some("fresh".into()),
    };
    assert!(matches!(
        set_password(&mut conn, user.id, &wrong),
        Err(Error::Validation(_))
    ));
    assert!(verify_password("ivan-secret", &get(&mut conn, user.id).unwrap().password));

    let missing = PasswordChange {
        current_password: Some("ivan-secret".into()),
        new_password: None,
    };
    assert!(set_password(&mut conn, user.id, &missing).is_err());

    let right = PasswordChange {
        current_password: Some("ivan-secret".into()),
        new_password: Some("fresh".into()),
    };
    set_password(&mut conn, user.id, &right).unwrap();
    let stored = get(&mut conn, user.id).unwrap().password;
    assert!(verify_password("fresh", &stored));
    assert!(!verify_password("ivan-secret", &stored));
}

#[test]
fn unknown_user_is_not_found() {
    let pool = database::test_pool();
    let mut conn = pool.get().unwrap();
    assert!(matches!(get(&mut conn, UserId(7)), Err(Error::NotFound("user"))));
}
