// Copyright 2023 Remi Bernotavicius

use crate::{Error, Result};
use diesel::connection::SimpleConnection as _;
use diesel::define_sql_function;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sql_types::Text;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

pub mod models;
pub mod schema;

pub type Connection = diesel::sqlite::SqliteConnection;
pub type Pool = r2d2::Pool<ConnectionManager<Connection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

define_sql_function! {
    /// Unicode lowercase. SQLite's own `lower()` and `LIKE` only fold ASCII.
    fn fold_case(text: Text) -> Text;
}

/// SQLite leaves foreign keys off unless asked, and custom functions live on
/// the connection, so both are set up per connection.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<Connection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(r2d2::Error::QueryError)?;
        fold_case_utils::register_impl(conn, |text: String| text.to_lowercase())
            .map_err(r2d2::Error::QueryError)
    }
}

pub fn establish_pool(path: impl AsRef<Path>, max_size: u32) -> Result<Pool> {
    let url = path.as_ref().to_string_lossy().into_owned();
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(ConnectionManager::new(url))?;

    let mut connection = pool.get()?;
    connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(Error::Migration)?;
    Ok(pool)
}

/// A single-connection pool over a fresh in-memory database.
#[cfg(test)]
pub fn test_pool() -> Pool {
    establish_pool(":memory:", 1).unwrap()
}

#[test]
fn migrations() {
    use diesel::Connection as _;

    let mut connection = Connection::establish(":memory:").unwrap();
    connection.run_pending_migrations(MIGRATIONS).unwrap();
    connection.revert_all_migrations(MIGRATIONS).unwrap();
    connection.run_pending_migrations(MIGRATIONS).unwrap();
}

#[test]
fn fold_case_handles_non_ascii() {
    use diesel::RunQueryDsl as _;

    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let folded: String = diesel::select(fold_case("МОЛОКО Crème"))
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(folded, "молоко crème");
}

#[test]
fn foreign_keys_are_enforced() {
    use diesel::RunQueryDsl as _;

    let pool = test_pool();
    let mut conn = pool.get().unwrap();
    let result = diesel::insert_into(schema::favorites::table)
        .values(models::Favorite {
            user_id: models::UserId(41),
            recipe_id: models::RecipeId(42),
        })
        .execute(&mut conn);
    assert!(result.is_err());
}
