// Configuration - layered settings and URL templates
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub http: HttpSettings,
    pub cache: CacheSettings,
    pub watchlist: WatchlistSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    pub default_duration_secs: u64,
    pub max_entries: usize,
    pub max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl CacheSettings {
    pub fn default_duration(&self) -> Duration {
        Duration::from_secs(self.default_duration_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchlistSettings {
    /// Quote URL with `${symbol}` and `${apikey}` placeholders.
    pub quote_url: String,
    pub cache_secs: u64,
}

impl Default for WatchlistSettings {
    fn default() -> Self {
        Self {
            quote_url: DEFAULT_QUOTE_URL.to_string(),
            cache_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

const DEFAULT_QUOTE_URL: &str =
    "https://www.alphavantage.co/query?function=GLOBAL_QUOTE&symbol=${symbol}&apikey=${apikey}";

/// Defaults, then `config/finboard.{toml,yaml,json}` if present, then
/// `FINBOARD__SECTION__KEY` environment variables.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .set_default("server.bind_addr", "0.0.0.0:8080")?
        .set_default("storage.path", "data/finboard.json")?
        .set_default("http.timeout_secs", 15_i64)?
        .set_default("http.user_agent", concat!("finboard/", env!("CARGO_PKG_VERSION")))?
        .set_default("cache.default_duration_secs", 60_i64)?
        .set_default("cache.max_entries", 512_i64)?
        .set_default("cache.max_age_secs", 86_400_i64)?
        .set_default("cache.sweep_interval_secs", 300_i64)?
        .set_default("watchlist.quote_url", DEFAULT_QUOTE_URL)?
        .set_default("watchlist.cache_secs", 60_i64)?
        .set_default("logging.level", "info")?
        .add_source(config::File::with_name("config/finboard").required(false))
        .add_source(
            config::Environment::with_prefix("FINBOARD")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace `${name}` placeholders in a template
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
