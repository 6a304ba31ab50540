//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Outgoing email configuration.
    pub email: EmailConfig,
    /// Open/vote tracking configuration.
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Bearer credential verification.
    pub auth: AuthConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this deployment, used in tracking and voting links.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Keep all state in process memory instead of `PostgreSQL` (development only).
    #[serde(default)]
    pub in_memory: bool,
}

/// Outgoing email configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Transport used to hand messages to a provider.
    #[serde(default)]
    pub provider: EmailProviderConfig,
    /// Sender address.
    pub from_address: String,
    /// Sender display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Reply-to address.
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Base delay of the linear retry backoff, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Total send attempts per message, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Email provider selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EmailProviderConfig {
    /// Log messages instead of sending them.
    #[default]
    Log,
    /// SMTP relay.
    Smtp {
        /// SMTP host
        host: String,
        /// SMTP port
        #[serde(default = "default_smtp_port")]
        port: u16,
        /// Use TLS
        #[serde(default = "default_true")]
        use_tls: bool,
        /// Username
        #[serde(default)]
        username: Option<String>,
        /// Password
        #[serde(default)]
        password: Option<String>,
    },
    /// `SendGrid` v3 mail API.
    SendGrid {
        /// API key
        api_key: String,
    },
    /// Mailgun messages API.
    Mailgun {
        /// API key
        api_key: String,
        /// Sending domain
        domain: String,
        /// Use EU region
        #[serde(default)]
        eu_region: bool,
    },
    /// Brevo transactional email API.
    Brevo {
        /// API key
        api_key: String,
    },
}

impl EmailProviderConfig {
    /// Short provider name for logs and status output.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Smtp { .. } => "smtp",
            Self::SendGrid { .. } => "sendgrid",
            Self::Mailgun { .. } => "mailgun",
            Self::Brevo { .. } => "brevo",
        }
    }
}

/// Open and vote tracking configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Where voters are redirected after a successful submission.
    /// Defaults to `{server.url}/polls/voted`.
    #[serde(default)]
    pub vote_confirmation_url: Option<String>,
    /// Lifetime of voting tokens in days.
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            vote_confirmation_url: None,
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

/// Bearer credential verification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify HS256 bearer tokens.
    pub jwt_secret: String,
    /// Expected `iss` claim, if any.
    #[serde(default)]
    pub issuer: Option<String>,
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding stored objects.
    #[serde(default = "default_storage_path")]
    pub base_path: PathBuf,
    /// URL prefix under which objects are served.
    #[serde(default = "default_storage_url")]
    pub base_url: String,
    /// Secret used to sign object URLs.
    #[serde(default)]
    pub signing_secret: String,
    /// Lifetime of signed URLs in seconds.
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
            base_url: default_storage_url(),
            signing_secret: String::new(),
            url_ttl_secs: default_url_ttl_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_from_name() -> String {
    "Mediate".to_string()
}

const fn default_retry_base_delay_ms() -> u64 {
    1000
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_true() -> bool {
    true
}

const fn default_token_ttl_days() -> i64 {
    30
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./files")
}

fn default_storage_url() -> String {
    "/files".to_string()
}

const fn default_url_ttl_secs() -> i64 {
    3600
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, into the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `MEDIATE_ENV`)
    /// 4. Environment variables with `MEDIATE__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("MEDIATE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("MEDIATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("MEDIATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Redirect target after a successful vote.
    #[must_use]
    pub fn vote_confirmation_url(&self) -> String {
        self.tracking.vote_confirmation_url.clone().unwrap_or_else(|| {
            format!("{}/polls/voted", self.server.url.trim_end_matches('/'))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const MINIMAL: &str = r#"
        [server]
        url = "https://mediate.example"

        [database]
        url = "postgres://localhost/mediate"

        [email]
        from_address = "noreply@mediate.example"

        [auth]
        jwt_secret = "secret"
    "#;

    #[test]
    fn test_defaults() {
        let config = parse(MINIMAL);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.email.max_attempts, 3);
        assert_eq!(config.email.retry_base_delay_ms, 1000);
        assert_eq!(config.email.provider.name(), "log");
        assert_eq!(config.tracking.token_ttl_days, 30);
        assert!(!config.database.in_memory);
        assert_eq!(
            config.vote_confirmation_url(),
            "https://mediate.example/polls/voted"
        );
    }

    #[test]
    fn test_tagged_provider() {
        let toml = format!(
            "{MINIMAL}\n[email.provider]\nkind = \"mailgun\"\napi_key = \"key\"\ndomain = \"mg.example\"\n"
        );
        let config = parse(&toml);
        match config.email.provider {
            EmailProviderConfig::Mailgun {
                ref domain,
                eu_region,
                ..
            } => {
                assert_eq!(domain, "mg.example");
                assert!(!eu_region);
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }
}
