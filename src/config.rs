// Copyright 2023 Remi Bernotavicius

use std::net::SocketAddr;
use std::path::PathBuf;

/// Settings for the HTTP server. Each one may also come from the environment.
#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "RECIPES_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Directory uploaded images are written to. Defaults to `media/` under the
    /// data directory.
    #[arg(long, env = "RECIPES_MEDIA_ROOT")]
    pub media_root: Option<PathBuf>,

    /// URL prefix stored images are served under
    #[arg(long, env = "RECIPES_MEDIA_URL", default_value = "/media/")]
    pub media_url: String,

    /// Default page size for the recipe list
    #[arg(long, env = "RECIPES_PAGE_SIZE", default_value_t = 6, value_parser = clap::value_parser!(i64).range(1..))]
    pub page_size: i64,

    /// Maximum number of pooled database connections
    #[arg(long, env = "RECIPES_POOL_SIZE", default_value_t = 8)]
    pub pool_size: u32,
}

#[test]
fn defaults() {
    use clap::Parser;

    #[derive(Parser)]
    struct Test {
        #[command(flatten)]
        serve: ServeArgs,
    }

    let args = Test::parse_from(["recipe-share"]).serve;
    assert_eq!(args.bind, "0.0.0.0:8000".parse().unwrap());
    assert_eq!(args.media_url, "/media/");
    assert_eq!(args.page_size, 6);
    assert_eq!(args.pool_size, 8);

    let args = Test::parse_from(["recipe-share", "--page-size", "10", "--bind", "127.0.0.1:9000"]).serve;
    assert_eq!(args.page_size, 10);
    assert_eq!(args.bind.port(), 9000);

    assert!(Test::try_parse_from(["recipe-share", "--page-size", "0"]).is_err());
}
