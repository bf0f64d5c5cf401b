use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub email: EmailConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default)]
    pub app_password: String,
    #[serde(default)]
    pub recipient_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_price_log")]
    pub price_log: PathBuf,
    #[serde(default = "default_alerted_file")]
    pub alerted_file: PathBuf,
}

/// A logical product with one entry per retailer selling it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub label: String,
    pub retailers: Vec<Retailer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retailer {
    pub name: String,
    pub url: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

fn default_price_log() -> PathBuf {
    PathBuf::from("price_history.csv")
}

fn default_alerted_file() -> PathBuf {
    PathBuf::from("last_alerted.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            price_log: default_price_log(),
            alerted_file: default_alerted_file(),
        }
    }
}

/// Identity key for one tracked retailer entry. Each retailer of a bucket
/// is tracked independently under this key.
pub fn product_key(label: &str, retailer_name: &str) -> String {
    format!("{} - {}", label, retailer_name)
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "PRICEWATCH_"
            .add_source(Environment::with_prefix("PRICEWATCH").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Credentials come from CI secrets when present; file values are the
        // fallback for local runs.
        if let Ok(v) = env::var("SENDER_EMAIL") {
            config.email.sender_email = v;
        }
        if let Ok(v) = env::var("APP_PASSWORD") {
            config.email.app_password = v;
        }
        if let Ok(v) = env::var("RECIPIENT_EMAIL") {
            config.email.recipient_email = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.smtp_port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        for bucket in &self.buckets {
            if bucket.label.trim().is_empty() {
                return Err(ConfigError::Message("Bucket label cannot be empty".into()));
            }
            for retailer in &bucket.retailers {
                if retailer.name.trim().is_empty() {
                    return Err(ConfigError::Message(format!(
                        "Retailer name cannot be empty in bucket '{}'",
                        bucket.label
                    )));
                }
                if Url::parse(&retailer.url).is_err() {
                    return Err(ConfigError::Message(format!(
                        "Invalid URL for '{}': {}",
                        product_key(&bucket.label, &retailer.name),
                        retailer.url
                    )));
                }
            }
        }

        Ok(())
    }

    /// All tracked product keys, in configuration order.
    pub fn product_keys(&self) -> Vec<String> {
        self.buckets
            .iter()
            .flat_map(|b| {
                b.retailers
                    .iter()
                    .map(|r| product_key(&b.label, &r.name))
            })
            .collect()
    }
}
