// Widget data service - fetches, normalizes and snapshots widget data
use crate::application::errors::{FetchError, WidgetDataError};
use crate::application::fetch_cache::{FetchCache, FetchOptions};
use crate::domain::dashboard::ApiKeys;
use crate::domain::normalizer::{
    detect_shape, normalize, select_fields, FieldMap, ResponseShape,
};
use crate::domain::provider::{apply_credentials, ApiProvider};
use crate::domain::series::{chart_points, table_rows, ChartPoint};
use crate::domain::widget::{ApiKeyLocation, WidgetConfig, WidgetType};
use crate::infrastructure::config::{render_template, WatchlistSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Fields shown on a card when the user has not picked any.
pub const DEFAULT_CARD_FIELDS: usize = 4;

const GLOBAL_QUOTE_KEY: &str = "Global Quote";

/// Everything a consumer needs to render one widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSnapshot {
    pub widget_id: String,
    /// Most recent successful payload. Survives failed refreshes.
    pub data: Option<Value>,
    pub shape: Option<ResponseShape>,
    pub available_fields: Vec<String>,
    pub fields: FieldMap,
    pub chart: Vec<ChartPoint>,
    pub rows: Vec<FieldMap>,
    pub quotes: Vec<WatchlistQuote>,
    pub loading: bool,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WidgetSnapshot {
    pub fn empty(widget_id: &str) -> Self {
        Self {
            widget_id: widget_id.to_string(),
            data: None,
            shape: None,
            available_fields: Vec::new(),
            fields: FieldMap::new(),
            chart: Vec::new(),
            rows: Vec::new(),
            quotes: Vec::new(),
            loading: false,
            error: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistQuote {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WatchlistQuote {
    fn failed(symbol: &str, error: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: 0.0,
            change: 0.0,
            change_percent: "0%".to_string(),
            error: Some(error),
        }
    }
}

/// Connection test input: an endpoint plus optional credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub api_endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_location: Option<ApiKeyLocation>,
    #[serde(default)]
    pub api_key_param_name: Option<String>,
    #[serde(default)]
    pub api_key_header_name: Option<String>,
}

impl DiscoveryRequest {
    fn into_config(self) -> WidgetConfig {
        let mut config = WidgetConfig::new(
            String::new(),
            WidgetType::Card,
            String::new(),
            self.api_endpoint,
            0,
        );
        config.api_key = self.api_key;
        config.api_key_location = self.api_key_location;
        config.api_key_param_name = self.api_key_param_name;
        config.api_key_header_name = self.api_key_header_name;
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDiscovery {
    pub provider: ApiProvider,
    pub shape: ResponseShape,
    pub fields: FieldMap,
    pub message: String,
}

enum Content {
    Payload(Arc<Value>),
    Watchlist(Vec<WatchlistQuote>),
}

#[derive(Clone)]
pub struct WidgetDataService {
    cache: Arc<FetchCache>,
    snapshots: Arc<Mutex<HashMap<String, WidgetSnapshot>>>,
    watchlist: WatchlistSettings,
}

impl WidgetDataService {
    pub fn new(cache: Arc<FetchCache>, watchlist: WatchlistSettings) -> Self {
        Self {
            cache,
            snapshots: Arc::new(Mutex::new(HashMap::new())),
            watchlist,
        }
    }

    /// Fetch fresh data for a widget and record the outcome.
    ///
    /// Failures never clear previously fetched data; they only set `error`.
    pub async fn refresh(&self, config: &WidgetConfig, keys: &ApiKeys, force: bool) -> WidgetSnapshot {
        let mut snapshot = {
            let mut snapshots = self.lock();
            let slot = snapshots
                .entry(config.id.clone())
                .or_insert_with(|| WidgetSnapshot::empty(&config.id));
            slot.loading = true;
            slot.clone()
        };

        let outcome = if config.is_watchlist() {
            Ok(Content::Watchlist(self.load_watchlist(config, keys, force).await))
        } else {
            self.fetch_payload(config, keys, force).await.map(Content::Payload)
        };

        snapshot.loading = false;
        match outcome.and_then(|content| apply_content(&mut snapshot, config, content)) {
            Ok(()) => {
                snapshot.error = None;
                snapshot.updated_at = Some(Utc::now());
            }
            Err(err) => {
                tracing::warn!(widget_id = %config.id, error = %err, "widget refresh failed");
                snapshot.error = Some(err.to_string());
            }
        }

        // A widget removed mid-refresh must not be resurrected.
        if let Some(slot) = self.lock().get_mut(&config.id) {
            *slot = snapshot.clone();
        }
        snapshot
    }

    /// Fetch an endpoint bypassing the cache and report its fields.
    pub async fn discover(
        &self,
        request: DiscoveryRequest,
        keys: &ApiKeys,
    ) -> Result<FieldDiscovery, WidgetDataError> {
        let config = request.into_config();
        let payload = self.fetch_payload(&config, keys, true).await?;
        let provider = ApiProvider::detect(&config.api_endpoint);
        let normalized = normalize(&payload, provider)?;

        let message = match normalized.shape {
            ResponseShape::TimeSeries => format!(
                "Time Series API detected! {} fields available (open, close, high, low, etc.).",
                normalized.fields.len()
            ),
            _ => format!("API connection successful! {} fields found.", normalized.fields.len()),
        };
        tracing::info!(endpoint = %config.api_endpoint, ?provider, shape = ?normalized.shape, "discovered fields");

        Ok(FieldDiscovery {
            provider,
            shape: normalized.shape,
            fields: normalized.fields,
            message,
        })
    }

    pub fn snapshot(&self, widget_id: &str) -> Option<WidgetSnapshot> {
        self.lock().get(widget_id).cloned()
    }

    /// Re-derive fields, rows and chart from the kept payload after the
    /// widget's display settings changed. Nothing is fetched.
    pub fn reconfigure(&self, config: &WidgetConfig) {
        let mut snapshots = self.lock();
        let Some(snapshot) = snapshots.get_mut(&config.id) else {
            return;
        };
        let Some(payload) = snapshot.data.clone() else {
            return;
        };
        if let Err(err) = derive_view(snapshot, config, &payload) {
            tracing::debug!(widget_id = %config.id, error = %err, "kept payload no longer normalizes");
        }
    }

    pub fn forget(&self, widget_id: &str) {
        self.lock().remove(widget_id);
    }

    async fn fetch_payload(
        &self,
        config: &WidgetConfig,
        keys: &ApiKeys,
        force: bool,
    ) -> Result<Arc<Value>, WidgetDataError> {
        if !config.is_configured() {
            return Err(WidgetDataError::UnconfiguredEndpoint);
        }
        let request = apply_credentials(&config.api_endpoint, &keys.credentials_for(config));
        let options = FetchOptions {
            duration: (config.refresh_interval > 0)
                .then(|| Duration::from_secs(config.refresh_interval)),
            force_refresh: force,
            headers: request.headers,
        };
        Ok(self.cache.get(&request.url, &options).await?)
    }

    async fn load_watchlist(
        &self,
        config: &WidgetConfig,
        keys: &ApiKeys,
        force: bool,
    ) -> Vec<WatchlistQuote> {
        let api_key = keys
            .get(ApiProvider::AlphaVantage)
            .or_else(|| config.api_key.as_deref().filter(|k| !k.is_empty()))
            .unwrap_or("demo");
        let symbols = config.watchlist_symbols.as_deref().unwrap_or_default();

        let fetches = symbols
            .iter()
            .map(|symbol| self.fetch_quote(symbol, api_key, force));
        futures::future::join_all(fetches).await
    }

    async fn fetch_quote(&self, symbol: &str, api_key: &str, force: bool) -> WatchlistQuote {
        let mut vars = HashMap::new();
        vars.insert("symbol".to_string(), urlencoding::encode(symbol).into_owned());
        vars.insert("apikey".to_string(), api_key.to_string());
        let url = render_template(&self.watchlist.quote_url, &vars);
        let options = FetchOptions {
            duration: Some(Duration::from_secs(self.watchlist.cache_secs)),
            force_refresh: force,
            headers: Vec::new(),
        };

        match self.cache.get(&url, &options).await {
            Ok(payload) => parse_quote(symbol, &payload),
            Err(err) => {
                tracing::debug!(symbol, error = %err, "quote fetch failed");
                WatchlistQuote::failed(symbol, quote_error(&err))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WidgetSnapshot>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply_content(
    snapshot: &mut WidgetSnapshot,
    config: &WidgetConfig,
    content: Content,
) -> Result<(), WidgetDataError> {
    match content {
        Content::Watchlist(quotes) => {
            snapshot.quotes = quotes;
        }
        Content::Payload(payload) => {
            derive_view(snapshot, config, &payload)?;
            snapshot.data = Some(Value::clone(&payload));
        }
    }
    Ok(())
}

// Everything in a snapshot that depends on the widget's display settings.
fn derive_view(
    snapshot: &mut WidgetSnapshot,
    config: &WidgetConfig,
    payload: &Value,
) -> Result<(), WidgetDataError> {
    let normalized = normalize(payload, ApiProvider::detect(&config.api_endpoint))?;
    snapshot.shape = Some(normalized.shape);
    snapshot.available_fields = normalized.fields.keys().cloned().collect();
    snapshot.fields =
        select_fields(&normalized.fields, &config.selected_fields, DEFAULT_CARD_FIELDS);
    snapshot.rows = match config.widget_type {
        WidgetType::Table => table_rows(payload),
        _ => Vec::new(),
    };
    snapshot.chart = match config.widget_type {
        WidgetType::Chart => chart_points(payload),
        _ => Vec::new(),
    };
    Ok(())
}

fn parse_quote(symbol: &str, payload: &Value) -> WatchlistQuote {
    let quote = payload
        .get(GLOBAL_QUOTE_KEY)
        .and_then(Value::as_object)
        .filter(|quote| !quote.is_empty());

    let Some(quote) = quote else {
        let error = match detect_shape(payload, ApiProvider::AlphaVantage) {
            ResponseShape::ProviderNotice => "Limit Reached",
            _ => "No Data",
        };
        return WatchlistQuote::failed(symbol, error.to_string());
    };

    let text = |key: &str| quote.get(key).and_then(Value::as_str);
    let number = |key: &str| text(key).and_then(|s| s.trim().parse::<f64>().ok()).unwrap_or(0.0);

    WatchlistQuote {
        symbol: text("01. symbol").unwrap_or(symbol).to_string(),
        price: number("05. price"),
        change: number("09. change"),
        change_percent: text("10. change percent").unwrap_or("0%").to_string(),
        error: None,
    }
}

fn quote_error(err: &FetchError) -> String {
    match err {
        FetchError::HttpStatus { status: 429, .. } => "Limit Reached".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fetch_cache::tests::FakeSource;
    use crate::application::json_source::JsonSource;
    use serde_json::json;

    const QUOTE_URL: &str = "https://quotes.test/q?symbol=${symbol}&apikey=${apikey}";

    fn service(source: &Arc<FakeSource>) -> WidgetDataService {
        let cache = Arc::new(FetchCache::new(Arc::clone(source) as Arc<dyn JsonSource>, 64));
        WidgetDataService::new(
            cache,
            WatchlistSettings {
                quote_url: QUOTE_URL.to_string(),
                cache_secs: 60,
            },
        )
    }

    fn widget(widget_type: WidgetType, endpoint: &str) -> WidgetConfig {
        WidgetConfig::new("w1".to_string(), widget_type, "Test".to_string(), endpoint.to_string(), 30)
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_defaults_to_first_fields() {
        let source = Arc::new(FakeSource::default());
        source.route(
            "https://api.test/card",
            json!({"a": 1, "b": {"c": 2, "d": 3}, "e": 4, "f": 5}),
        );
        let service = service(&source);

        let snapshot = service
            .refresh(&widget(WidgetType::Card, "https://api.test/card"), &ApiKeys::default(), false)
            .await;

        assert_eq!(snapshot.error, None);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.shape, Some(ResponseShape::Generic));
        assert_eq!(snapshot.available_fields, vec!["a", "b.c", "b.d", "e", "f"]);
        assert_eq!(
            snapshot.fields.keys().collect::<Vec<_>>(),
            vec!["a", "b.c", "b.d", "e"]
        );
        assert!(snapshot.updated_at.is_some());
        assert_eq!(service.snapshot("w1"), Some(snapshot));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_data() {
        let source = Arc::new(FakeSource::default());
        source.route("https://api.test/card", json!({"price": 10}));
        let service = service(&source);
        let config = widget(WidgetType::Card, "https://api.test/card");

        let first = service.refresh(&config, &ApiKeys::default(), false).await;
        source.push(Err(FetchError::http_status(503, "unavailable")));
        let second = service.refresh(&config, &ApiKeys::default(), true).await;

        assert_eq!(second.data, first.data);
        assert_eq!(second.fields, first.fields);
        assert_eq!(second.updated_at, first.updated_at);
        assert_eq!(second.error.as_deref(), Some("API error 503: unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_endpoint_reports_error_without_fetching() {
        let source = Arc::new(FakeSource::default());
        let service = service(&source);

        let snapshot = service
            .refresh(&widget(WidgetType::Card, "  "), &ApiKeys::default(), false)
            .await;

        assert_eq!(snapshot.error.as_deref(), Some("no API endpoint configured"));
        assert_eq!(snapshot.data, None);
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_notice_becomes_error() {
        let source = Arc::new(FakeSource::default());
        source.route(
            "https://www.alphavantage.co/query?function=X&apikey=av",
            json!({"Note": "Thank you for using Alpha Vantage!"}),
        );
        let service = service(&source);
        let keys = ApiKeys {
            alphavantage: "av".to_string(),
            finnhub: String::new(),
        };

        let snapshot = service
            .refresh(
                &widget(WidgetType::Card, "https://www.alphavantage.co/query?function=X"),
                &keys,
                false,
            )
            .await;

        assert_eq!(
            snapshot.error.as_deref(),
            Some("provider notice: Thank you for using Alpha Vantage!")
        );
        assert_eq!(snapshot.data, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chart_and_table_derive_series() {
        let source = Arc::new(FakeSource::default());
        let payload = json!({
            "Meta Data": {"2. Symbol": "IBM"},
            "Time Series (Daily)": {
                "2024-01-02": {"1. open": "2", "2. high": "3", "3. low": "1", "4. close": "2.5", "5. volume": "10"},
                "2024-01-01": {"1. open": "1", "2. high": "2", "3. low": "0.5", "4. close": "1.5", "5. volume": "5"}
            }
        });
        source.route("https://api.test/series", payload);
        let service = service(&source);

        let chart = service
            .refresh(&widget(WidgetType::Chart, "https://api.test/series"), &ApiKeys::default(), false)
            .await;
        let dates: Vec<_> = chart.chart.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-02"]);
        assert!(chart.rows.is_empty());

        let table = service
            .refresh(&widget(WidgetType::Table, "https://api.test/series"), &ApiKeys::default(), false)
            .await;
        assert_eq!(table.rows.len(), 2);
        assert!(table.chart.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchlist_records_per_symbol_failures() {
        let source = Arc::new(FakeSource::default());
        source.route(
            "https://quotes.test/q?symbol=IBM&apikey=demo",
            json!({"Global Quote": {
                "01. symbol": "IBM", "05. price": "182.50",
                "09. change": "-1.25", "10. change percent": "-0.68%"
            }}),
        );
        source.route(
            "https://quotes.test/q?symbol=AAPL&apikey=demo",
            json!({"Information": "rate limit"}),
        );
        source.route("https://quotes.test/q?symbol=NVDA&apikey=demo", json!({"Global Quote": {}}));
        let service = service(&source);
        let mut config = widget(WidgetType::Table, "");
        config.watchlist_symbols = Some(vec!["IBM".into(), "AAPL".into(), "NVDA".into()]);

        let snapshot = service.refresh(&config, &ApiKeys::default(), false).await;

        assert_eq!(snapshot.error, None);
        let quotes = &snapshot.quotes;
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0].price, 182.5);
        assert_eq!(quotes[0].change, -1.25);
        assert_eq!(quotes[0].change_percent, "-0.68%");
        assert_eq!(quotes[1].error.as_deref(), Some("Limit Reached"));
        assert_eq!(quotes[2].error.as_deref(), Some("No Data"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchlist_prefers_stored_key() {
        let source = Arc::new(FakeSource::default());
        let service = service(&source);
        let mut config = widget(WidgetType::Table, "");
        config.api_key = Some("widget".to_string());
        config.watchlist_symbols = Some(vec!["BRK.B".into()]);
        let keys = ApiKeys {
            alphavantage: "stored".to_string(),
            finnhub: String::new(),
        };

        service.refresh(&config, &keys, false).await;

        let calls = source.calls.lock().unwrap();
        assert_eq!(calls[0].0, "https://quotes.test/q?symbol=BRK.B&apikey=stored");
    }

    #[tokio::test(start_paused = true)]
    async fn test_widget_forgotten_mid_refresh_is_not_resurrected() {
        let source = Arc::new(FakeSource::default());
        source.delay_responses(Duration::from_secs(10));
        let service = service(&source);
        let config = widget(WidgetType::Card, "https://api.test/card");

        let pending = tokio::spawn({
            let service = service.clone();
            let config = config.clone();
            async move { service.refresh(&config, &ApiKeys::default(), false).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.call_count(), 1);
        assert!(service.snapshot("w1").is_some_and(|s| s.loading));

        service.forget("w1");
        let finished = pending.await.unwrap();

        assert!(finished.data.is_some());
        assert_eq!(service.snapshot("w1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_rederives_view_without_fetching() {
        let source = Arc::new(FakeSource::default());
        let payload = json!({
            "Time Series (Daily)": {
                "2024-01-02": {"1. open": "2", "4. close": "2.5"},
                "2024-01-01": {"1. open": "1", "4. close": "1.5"}
            }
        });
        source.route("https://api.test/series", payload);
        let service = service(&source);
        let mut config = widget(WidgetType::Card, "https://api.test/series");

        service.refresh(&config, &ApiKeys::default(), false).await;
        config.selected_fields = vec!["close".to_string()];
        config.widget_type = WidgetType::Chart;
        service.reconfigure(&config);

        let snapshot = service.snapshot("w1").unwrap();
        assert_eq!(snapshot.fields, json!({"close": "2.5"}).as_object().cloned().unwrap());
        assert_eq!(snapshot.chart.len(), 2);
        assert!(snapshot.rows.is_empty());
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_bypasses_cache_and_counts_fields() {
        let source = Arc::new(FakeSource::default());
        source.route("https://api.test/d?apikey=k", json!({"x": {"y": 1}, "z": true}));
        let service = service(&source);
        let request = DiscoveryRequest {
            api_endpoint: "https://api.test/d".to_string(),
            api_key: Some("k".to_string()),
            api_key_location: None,
            api_key_param_name: None,
            api_key_header_name: None,
        };

        let first = service.discover(request.clone(), &ApiKeys::default()).await.unwrap();
        service.discover(request, &ApiKeys::default()).await.unwrap();

        assert_eq!(first.provider, ApiProvider::Unknown);
        assert_eq!(first.message, "API connection successful! 2 fields found.");
        assert_eq!(source.call_count(), 2);
    }
}
