// Dashboard domain model - persisted widget collection and provider keys
use super::provider::ApiProvider;
use super::widget::{ApiKeyLocation, Credentials, Widget, WidgetConfig, WidgetSize, WidgetType};
use serde::{Deserialize, Serialize};

/// Name of the single storage record the dashboard is persisted under.
pub const STORAGE_RECORD: &str = "finboard-storage";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    #[serde(default)]
    pub widgets: Vec<Widget>,
    #[serde(default)]
    pub api_keys: ApiKeys,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub alphavantage: String,
    #[serde(default)]
    pub finnhub: String,
}

impl ApiKeys {
    pub fn get(&self, provider: ApiProvider) -> Option<&str> {
        let key = match provider {
            ApiProvider::AlphaVantage => &self.alphavantage,
            ApiProvider::Finnhub => &self.finnhub,
            ApiProvider::Unknown => return None,
        };
        if key.is_empty() { None } else { Some(key.as_str()) }
    }

    /// Credentials for a widget, falling back to the stored provider key when
    /// the widget carries none of its own.
    pub fn credentials_for(&self, config: &WidgetConfig) -> Credentials {
        let mut credentials = config.credentials();
        if credentials.key.is_some() {
            return credentials;
        }
        let provider = ApiProvider::detect(&config.api_endpoint);
        if let Some(stored) = self.get(provider) {
            credentials.key = Some(stored.to_string());
            credentials.location = ApiKeyLocation::Query;
            if config.api_key_param_name.is_none() {
                credentials.param_name = provider.default_key_param().to_string();
            }
        }
        credentials
    }

    /// Returns false for providers that have no key slot.
    pub fn set(&mut self, provider: ApiProvider, key: String) -> bool {
        match provider {
            ApiProvider::AlphaVantage => self.alphavantage = key,
            ApiProvider::Finnhub => self.finnhub = key,
            ApiProvider::Unknown => return false,
        }
        true
    }
}

/// Ready-made widgets that showcase the supported response shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemoKind {
    Gainers,
    Fundamentals,
    Watchlist,
    Chart,
}

impl DemoKind {
    fn slug(self) -> &'static str {
        match self {
            DemoKind::Gainers => "gainers",
            DemoKind::Fundamentals => "fundamentals",
            DemoKind::Watchlist => "watchlist",
            DemoKind::Chart => "chart",
        }
    }

    /// Build the demo configuration. `stamp_ms` keeps ids unique across calls.
    pub fn config(self, stamp_ms: i64) -> (WidgetConfig, WidgetSize) {
        let id = format!("demo-{}-{}", self.slug(), stamp_ms);
        let (widget_type, title, endpoint, interval, fields) = match self {
            DemoKind::Gainers => (
                WidgetType::Table,
                "Top Gainers",
                "https://www.alphavantage.co/query?function=TOP_GAINERS_LOSERS",
                300,
                vec![],
            ),
            DemoKind::Fundamentals => (
                WidgetType::Card,
                "IBM Fundamentals",
                "https://www.alphavantage.co/query?function=OVERVIEW&symbol=IBM",
                86_400,
                vec!["52WeekHigh", "52WeekLow", "PERatio", "DividendYield"],
            ),
            DemoKind::Watchlist => (WidgetType::Table, "My Watchlist", "", 60, vec![]),
            DemoKind::Chart => (
                WidgetType::Chart,
                "IBM Time Series",
                "https://www.alphavantage.co/query?function=TIME_SERIES_DAILY&symbol=IBM",
                60,
                vec!["close", "open", "high", "low"],
            ),
        };

        let mut config = WidgetConfig::new(
            id,
            widget_type,
            title.to_string(),
            endpoint.to_string(),
            interval,
        );
        config.selected_fields = fields.into_iter().map(str::to_string).collect();
        config.api_key = Some("demo".to_string());
        config.api_key_location = Some(ApiKeyLocation::Query);
        config.api_key_param_name = Some("apikey".to_string());
        if self == DemoKind::Watchlist {
            config.watchlist_symbols = Some(
                ["IBM", "AAPL", "NVDA", "MSFT"]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            );
        }

        let size = match self {
            DemoKind::Fundamentals => WidgetSize::Fundamentals,
            _ => WidgetSize::Standard(widget_type),
        };
        (config, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_keys_lookup() {
        let mut keys = ApiKeys::default();
        assert_eq!(keys.get(ApiProvider::Finnhub), None);
        assert!(keys.set(ApiProvider::Finnhub, "fh".to_string()));
        assert!(!keys.set(ApiProvider::Unknown, "x".to_string()));
        assert_eq!(keys.get(ApiProvider::Finnhub), Some("fh"));
        assert_eq!(keys.get(ApiProvider::Unknown), None);
    }

    #[test]
    fn test_stored_key_fills_in_missing_widget_key() {
        let keys = ApiKeys {
            alphavantage: String::new(),
            finnhub: "fh".to_string(),
        };
        let mut config = WidgetConfig::new(
            "q".to_string(),
            WidgetType::Card,
            "AAPL".to_string(),
            "https://finnhub.io/api/v1/quote?symbol=AAPL".to_string(),
            30,
        );

        let creds = keys.credentials_for(&config);
        assert_eq!(creds.key.as_deref(), Some("fh"));
        assert_eq!(creds.param_name, "token");

        config.api_key = Some("own".to_string());
        assert_eq!(keys.credentials_for(&config).key.as_deref(), Some("own"));

        config.api_key = None;
        config.api_endpoint = "https://example.com/q".to_string();
        assert_eq!(keys.credentials_for(&config).key, None);
    }

    #[test]
    fn test_demo_fundamentals_uses_compact_card() {
        let (config, size) = DemoKind::Fundamentals.config(42);
        assert_eq!(config.id, "demo-fundamentals-42");
        assert_eq!(config.widget_type, WidgetType::Card);
        assert_eq!(size.dimensions(), (3, 2));
        assert_eq!(config.selected_fields.len(), 4);
    }

    #[test]
    fn test_demo_watchlist_is_unconfigured_endpoint() {
        let (config, size) = DemoKind::Watchlist.config(1);
        assert!(config.is_watchlist());
        assert!(!config.is_configured());
        assert_eq!(size.dimensions(), (6, 4));
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let (config, _) = DemoKind::Chart.config(7);
        let state = DashboardState {
            widgets: vec![Widget {
                layout: crate::domain::widget::WidgetLayout::new(config.id.clone(), 0, 0, 6, 4),
                config,
            }],
            api_keys: ApiKeys {
                alphavantage: "av".to_string(),
                finnhub: String::new(),
            },
        };
        let text = serde_json::to_string(&state).unwrap();
        let back: DashboardState = serde_json::from_str(&text).unwrap();
        assert_eq!(back, state);
    }
}
