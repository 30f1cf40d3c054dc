// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use clap::Subcommand;
use log::{info, LevelFilter};
use std::path::PathBuf;

mod api;
mod catalog;
mod config;
mod database;
mod error;
mod import;
mod media;
mod pagination;
mod recipes;
mod subscriptions;
mod users;

pub use error::Error;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
#[command(about = "Recipe sharing backend")]
struct Args {
    /// Path to the SQLite database. Defaults to `data.sqlite` in the data directory.
    #[arg(long, global = true, env = "RECIPES_DATABASE")]
    database: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(config::ServeArgs),
    /// Load ingredients from a headerless `name,measurement_unit` CSV file
    ImportIngredients { path: PathBuf },
    /// Create an account
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long, env = "RECIPES_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

/// This is where the database and uploaded media live on-disk. On Linux it should be like:
/// `~/.local/share/recipe_share/`
fn data_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "failed to get user home directory",
        )
    })?;
    let path = dirs.data_dir().join("recipe_share");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

async fn serve(pool: database::Pool, args: config::ServeArgs) -> Result<()> {
    let media_root = match args.media_root {
        Some(root) => root,
        None => data_path()?.join("media"),
    };
    std::fs::create_dir_all(&media_root)?;
    info!("storing media in {}", media_root.display());

    let state = api::AppState::new(
        pool,
        media::MediaStore::new(media_root, args.media_url),
        args.page_size,
    );
    api::serve(state, args.bind).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level)
        .init()?;

    let database = match args.database {
        Some(path) => path,
        None => data_path()?.join("data.sqlite"),
    };
    let pool_size = match &args.commands {
        Commands::Serve(serve) => serve.pool_size,
        _ => 1,
    };
    info!("opening database {}", database.display());
    let pool = database::establish_pool(&database, pool_size)?;

    match args.commands {
        Commands::Serve(serve_args) => serve(pool, serve_args).await?,
        Commands::ImportIngredients { path } => {
            let mut conn = pool.get()?;
            import::import_ingredients(&mut conn, path)?;
        }
        Commands::CreateUser {
            email,
            username,
            first_name,
            last_name,
            password,
        } => {
            let mut conn = pool.get()?;
            let registration = users::Registration {
                email: Some(email),
                username: Some(username),
                first_name: Some(first_name),
                last_name: Some(last_name),
                password: Some(password),
            };
            let user = users::register(&mut conn, &registration)?;
            info!("created user {} with id {}", user.username, user.id);
        }
    }
    Ok(())
}
