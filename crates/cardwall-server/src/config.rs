use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};

use cardwall_api::assets::{DEFAULT_BANNER_MAX, DEFAULT_MAX_IMAGE_BYTES, Dimensions, UploadLimits};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    /// Prefix for asset URLs handed to clients. Always ends with `/`.
    pub public_url: String,
    pub jwt_secret: String,
    pub limits: UploadLimits,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("CARDWALL_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CARDWALL_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let host = lookup("CARDWALL_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&lookup, "CARDWALL_PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let db_path = lookup("CARDWALL_DB_PATH").unwrap_or_else(|| "cardwall.db".into());
        let upload_dir = lookup("CARDWALL_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into());

        let mut public_url = lookup("CARDWALL_PUBLIC_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}/uploads/", port));
        if !public_url.ends_with('/') {
            public_url.push('/');
        }

        let limits = UploadLimits {
            max_image_bytes: parse_or(&lookup, "CARDWALL_MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES)?,
            banner_max: Dimensions {
                width: parse_or(&lookup, "CARDWALL_BANNER_MAX_WIDTH", DEFAULT_BANNER_MAX.width)?,
                height: parse_or(&lookup, "CARDWALL_BANNER_MAX_HEIGHT", DEFAULT_BANNER_MAX.height)?,
            },
        };

        Ok(Self {
            addr,
            db_path: db_path.into(),
            upload_dir: upload_dir.into(),
            public_url,
            jwt_secret,
            limits,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value {:?}", key, raw)),
        None => Ok(default),
    }
}
