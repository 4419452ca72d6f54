// Response normalizer - turns arbitrary JSON payloads into flat, addressable fields
use super::provider::ApiProvider;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Ordered mapping of dotted path to leaf value. Order is traversal order.
pub type FieldMap = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("provider notice: {0}")]
    RateLimited(String),
}

/// Recognized payload layouts, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    ProviderNotice,
    TimeSeries,
    FinnhubQuote,
    FinnhubProfile,
    FinnhubCandle,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Normalized {
    pub shape: ResponseShape,
    pub fields: FieldMap,
}

type Detector = fn(&Map<String, Value>, ApiProvider) -> bool;

// First match wins; `Generic` is the fallback when nothing matches.
const DETECTORS: &[(ResponseShape, Detector)] = &[
    (ResponseShape::ProviderNotice, is_provider_notice),
    (ResponseShape::TimeSeries, is_time_series),
    (ResponseShape::FinnhubQuote, is_finnhub_quote),
    (ResponseShape::FinnhubProfile, is_finnhub_profile),
    (ResponseShape::FinnhubCandle, is_finnhub_candle),
];

const ERROR_MESSAGE_KEY: &str = "Error Message";
const NOTICE_KEYS: [&str; 2] = ["Information", "Note"];
const TIME_SERIES_MARKER: &str = "Time Series";

/// `(output name, accepted source keys)` for a time-series entry.
const TIME_SERIES_FIELDS: &[(&str, &[&str])] = &[
    ("open", &["1. open"]),
    ("high", &["2. high"]),
    ("low", &["3. low"]),
    ("close", &["4. close"]),
    ("adjusted close", &["5. adjusted close"]),
    ("volume", &["5. volume", "6. volume"]),
    ("dividend amount", &["7. dividend amount"]),
];

const FINNHUB_QUOTE_FIELDS: &[(&str, &str)] = &[
    ("current", "c"),
    ("change", "d"),
    ("percent_change", "dp"),
    ("high", "h"),
    ("low", "l"),
    ("open", "o"),
    ("previous_close", "pc"),
    ("timestamp", "t"),
];

const FINNHUB_PROFILE_FIELDS: &[(&str, &str)] = &[
    ("country", "country"),
    ("currency", "currency"),
    ("exchange", "exchange"),
    ("name", "name"),
    ("ticker", "ticker"),
    ("ipo", "ipo"),
    ("market_cap", "marketCapitalization"),
    ("shares_outstanding", "shareOutstanding"),
    ("logo", "logo"),
    ("phone", "phone"),
    ("weburl", "weburl"),
    ("industry", "finnhubIndustry"),
];

const FINNHUB_CANDLE_FIELDS: &[(&str, &str)] = &[
    ("close", "c"),
    ("high", "h"),
    ("low", "l"),
    ("open", "o"),
    ("status", "s"),
    ("timestamp", "t"),
    ("volume", "v"),
];

/// Flatten nested objects into dotted paths. Arrays and nulls are leaves.
///
/// A top-level array is keyed by element index (`0.symbol`, `1.symbol`, ...);
/// nested arrays are never expanded.
pub fn flatten(value: &Value) -> FieldMap {
    let mut out = FieldMap::new();
    match value {
        Value::Object(obj) => flatten_into(obj, "", &mut out),
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                flatten_entry(idx.to_string(), item, &mut out);
            }
        }
        _ => {}
    }
    out
}

fn flatten_into(obj: &Map<String, Value>, prefix: &str, out: &mut FieldMap) {
    for (key, value) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        flatten_entry(path, value, out);
    }
}

fn flatten_entry(path: String, value: &Value, out: &mut FieldMap) {
    match value {
        Value::Object(inner) => flatten_into(inner, &path, out),
        leaf => {
            out.insert(path, leaf.clone());
        }
    }
}

/// Detect the payload shape for a given provider.
pub fn detect_shape(value: &Value, provider: ApiProvider) -> ResponseShape {
    let Value::Object(obj) = value else {
        return ResponseShape::Generic;
    };
    DETECTORS
        .iter()
        .find(|(_, detector)| detector(obj, provider))
        .map(|(shape, _)| *shape)
        .unwrap_or(ResponseShape::Generic)
}

/// Normalize a payload into display fields.
pub fn normalize(value: &Value, provider: ApiProvider) -> Result<Normalized, NormalizeError> {
    let shape = detect_shape(value, provider);
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);

    let fields = match shape {
        ResponseShape::ProviderNotice => return Err(notice_error(obj)),
        ResponseShape::TimeSeries => extract_time_series(obj).unwrap_or_default(),
        ResponseShape::FinnhubQuote => rename_fields(obj, FINNHUB_QUOTE_FIELDS),
        ResponseShape::FinnhubProfile => rename_fields(obj, FINNHUB_PROFILE_FIELDS),
        ResponseShape::FinnhubCandle => rename_fields(obj, FINNHUB_CANDLE_FIELDS),
        ResponseShape::Generic => flatten(value),
    };

    tracing::debug!(?shape, fields = fields.len(), "normalized payload");
    Ok(Normalized { shape, fields })
}

fn is_provider_notice(obj: &Map<String, Value>, provider: ApiProvider) -> bool {
    provider != ApiProvider::Finnhub
        && (obj.contains_key(ERROR_MESSAGE_KEY) || NOTICE_KEYS.iter().any(|k| obj.contains_key(*k)))
}

fn is_time_series(obj: &Map<String, Value>, provider: ApiProvider) -> bool {
    provider != ApiProvider::Finnhub && extract_time_series(obj).is_some()
}

fn is_finnhub_quote(obj: &Map<String, Value>, provider: ApiProvider) -> bool {
    provider == ApiProvider::Finnhub && obj.contains_key("c") && obj.contains_key("d")
}

fn is_finnhub_profile(obj: &Map<String, Value>, provider: ApiProvider) -> bool {
    provider == ApiProvider::Finnhub
        && (obj.get("name").is_some_and(is_truthy) || obj.get("ticker").is_some_and(is_truthy))
}

fn is_finnhub_candle(obj: &Map<String, Value>, provider: ApiProvider) -> bool {
    provider == ApiProvider::Finnhub && obj.get("c").is_some_and(Value::is_array)
}

fn notice_error(obj: &Map<String, Value>) -> NormalizeError {
    if let Some(message) = obj.get(ERROR_MESSAGE_KEY) {
        return NormalizeError::ProviderError(message_text(message));
    }
    let message = NOTICE_KEYS
        .iter()
        .find_map(|k| obj.get(*k))
        .map(message_text)
        .unwrap_or_default();
    NormalizeError::RateLimited(message)
}

fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The first object key containing "Time Series".
pub fn time_series_key(obj: &Map<String, Value>) -> Option<&str> {
    obj.keys()
        .find(|k| k.contains(TIME_SERIES_MARKER))
        .map(String::as_str)
}

/// Canonical OHLCV fields present in the first (most recent) entry of a time series.
fn extract_time_series(obj: &Map<String, Value>) -> Option<FieldMap> {
    let series = obj.get(time_series_key(obj)?)?.as_object()?;
    let (_, first_entry) = series.iter().next()?;
    let entry = first_entry.as_object()?;

    let mut fields = FieldMap::new();
    for (name, sources) in TIME_SERIES_FIELDS {
        if let Some(value) = sources
            .iter()
            .filter_map(|k| entry.get(*k))
            .find(|v| is_truthy(v))
        {
            fields.insert((*name).to_string(), value.clone());
        }
    }

    if fields.is_empty() { None } else { Some(fields) }
}

fn rename_fields(obj: &Map<String, Value>, table: &[(&str, &str)]) -> FieldMap {
    table
        .iter()
        .map(|(name, source)| {
            let value = obj.get(*source).cloned().unwrap_or(Value::Null);
            ((*name).to_string(), value)
        })
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Look up a dotted path in a raw (unflattened) payload.
pub fn value_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |acc, part| match acc {
        Value::Object(obj) => obj.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Pick the fields to display: the caller's selection in its order, or the
/// first `default_limit` discovered fields when nothing is selected.
pub fn select_fields(fields: &FieldMap, selected: &[String], default_limit: usize) -> FieldMap {
    if selected.is_empty() {
        return fields
            .iter()
            .take(default_limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
    }
    selected
        .iter()
        .map(|path| (path.clone(), fields.get(path).cloned().unwrap_or(Value::Null)))
        .collect()
}
