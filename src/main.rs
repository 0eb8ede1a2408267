use slog::o;
use slog::Drain;
use sqlx::postgres::PgPoolOptions;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

/// A free-form error message, built with `se!`
#[derive(Debug)]
pub struct StringError(pub String);
impl std::fmt::Display for StringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::error::Error for StringError {}

#[macro_export]
macro_rules! se {
    ($($arg:tt)*) => {
        $crate::StringError(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! resp {
    (json => $obj:expr) => {{
        let body = tide::Body::from_json(&$obj)?;
        tide::Response::builder(200).body(body).build()
    }};
}

mod caching;
mod crypto;
mod error;
mod images;
mod logging;
mod models;
mod raster;
mod recent;
mod render;
mod service;
mod spotify;
mod store;
mod tokens;
mod utils;

fn env_or(k: &str, default: &str) -> String {
    env::var(k).unwrap_or_else(|_| default.to_string())
}

lazy_static::lazy_static! {
    // The "base" logger that all modules should branch off of
    pub static ref BASE_LOG: slog::Logger = {
        let level: slog::Level = env_or("LOG_LEVEL", "INFO")
                .parse()
                .unwrap_or(slog::Level::Info);
        if env_or("LOG_FORMAT", "json").to_lowercase().trim() == "pretty" {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::CompactFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        } else {
            let drain = slog_json::Json::default(std::io::stderr()).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        }
    };

    // Base logger
    pub static ref LOG: slog::Logger = BASE_LOG.new(slog::o!("app" => "spot-badge"));
}

#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    pub host: String,
    pub port: u16,
    // public base url this service is reachable at, used
    // to build the spotify oauth redirect uri.
    pub base_url: String,
    pub log_format: String,
    pub log_level: String,
    pub spotify_client_id: String,
    pub spotify_secret_id: String,
    pub spotify_accounts_url: String,
    pub spotify_api_url: String,
    pub db_url: String,
    pub upstream_timeout: Duration,
    pub image_timeout: Duration,
}

fn env_seconds(k: &str, default: &str) -> anyhow::Result<Duration> {
    let raw = env_or(k, default);
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {} {:?}: {}", k, raw, e))?;
    Ok(Duration::from_secs(secs))
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let version = env::var("VERSION").ok().unwrap_or_else(|| {
            fs::File::open("commit_hash.txt")
                .and_then(|mut f| {
                    let mut s = String::new();
                    f.read_to_string(&mut s)?;
                    Ok(s.trim().to_string())
                })
                .unwrap_or_else(|_| "dev".to_string())
        });
        let port = env_or("PORT", "3030");
        Ok(Self {
            version,
            host: env_or("HOST", "0.0.0.0"),
            port: port
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid PORT {:?}: {}", port, e))?,
            base_url: env_or("BASE_URL", "http://localhost:3030")
                .trim_end_matches('/')
                .to_string(),
            log_format: env_or("LOG_FORMAT", "json")
                .to_lowercase()
                .trim()
                .to_string(),
            log_level: env_or("LOG_LEVEL", "INFO"),
            spotify_client_id: env_or("SPOTIFY_CLIENT_ID", "fake"),
            spotify_secret_id: env_or("SPOTIFY_SECRET_ID", "fake"),
            spotify_accounts_url: env_or("SPOTIFY_ACCOUNTS_URL", "https://accounts.spotify.com")
                .trim_end_matches('/')
                .to_string(),
            spotify_api_url: env_or("SPOTIFY_API_URL", "https://api.spotify.com/v1")
                .trim_end_matches('/')
                .to_string(),
            db_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            upstream_timeout: env_seconds("UPSTREAM_TIMEOUT_SECONDS", "10")?,
            image_timeout: env_seconds("IMAGE_TIMEOUT_SECONDS", "3")?,
        })
    }

    pub fn initialize(&self) {
        slog::info!(
            LOG, "initialized config";
            "version" => &self.version,
            "host" => &self.host,
            "port" => &self.port,
            "base_url" => &self.base_url,
            "log_format" => &self.log_format,
            "log_level" => &self.log_level,
            "upstream_timeout_seconds" => self.upstream_timeout.as_secs(),
        );
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn spotify_redirect_url(&self) -> String {
        format!("{}/callback", self.base_url)
    }

    pub fn spotify_authorize_url(&self) -> String {
        format!(
            "{accounts}/authorize?client_id={id}&response_type=code&scope={scope}&redirect_uri={redirect}",
            accounts = self.spotify_accounts_url,
            id = self.spotify_client_id,
            scope = "user-read-currently-playing,user-read-recently-played",
            redirect = self.spotify_redirect_url(),
        )
    }
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    // try sourcing a .env if one exists
    dotenv::dotenv().ok();
    let config = Arc::new(Config::load()?);
    config.initialize();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let images = images::Inliner::new(Arc::new(images::HttpImageSource::new(
        config.image_timeout,
    )));
    let ctx = service::Context {
        config: config.clone(),
        store: Arc::new(store::PgStore::new(pool)),
        spotify: Arc::new(spotify::SpotifyClient::new(&config)),
        images: Arc::new(images),
    };
    service::start(ctx).await
}

#[cfg(test)]
pub mod test_support {
    use super::Config;
    use std::time::Duration;

    pub fn config() -> Config {
        Config {
            version: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: "http://badge.test".to_string(),
            log_format: "json".to_string(),
            log_level: "INFO".to_string(),
            spotify_client_id: "client".to_string(),
            spotify_secret_id: "secret".to_string(),
            spotify_accounts_url: "https://accounts.spotify.test".to_string(),
            spotify_api_url: "https://api.spotify.test/v1".to_string(),
            db_url: "postgres://unused".to_string(),
            upstream_timeout: Duration::from_secs(1),
            image_timeout: Duration::from_secs(1),
        }
    }
}
