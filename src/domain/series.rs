// Chart and table row extraction for time-series style payloads
use super::normalizer::{flatten, time_series_key, FieldMap};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Build chart points in ascending date order.
///
/// Providers list time series newest first, so keyed series are reversed.
pub fn chart_points(value: &Value) -> Vec<ChartPoint> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| ChartPoint {
                date: first_string(item, &["date", "time"])
                    .unwrap_or_else(|| format!("Point {}", idx + 1)),
                open: first_number(item, &["open"]),
                high: first_number(item, &["high"]),
                low: first_number(item, &["low"]),
                close: first_number(item, &["close", "price", "value"]),
                volume: first_number(item, &["volume"]) as i64,
            })
            .collect(),
        Value::Object(obj) => {
            let series = match time_series_key(obj).and_then(|k| obj.get(k)) {
                Some(Value::Object(series)) => series,
                _ if has_date_keys(obj) => obj,
                _ => return Vec::new(),
            };
            let mut points: Vec<ChartPoint> = series
                .iter()
                .map(|(date, values)| keyed_point(date, values))
                .collect();
            points.reverse();
            points
        }
        _ => Vec::new(),
    }
}

fn keyed_point(date: &str, values: &Value) -> ChartPoint {
    if !values.is_object() {
        return ChartPoint {
            date: date.to_string(),
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: number_of(values),
            volume: 0,
        };
    }
    ChartPoint {
        date: date.to_string(),
        open: first_number(values, &["1. open", "open"]),
        high: first_number(values, &["2. high", "high"]),
        low: first_number(values, &["3. low", "low"]),
        close: first_number(values, &["4. close", "5. adjusted close", "close", "price"]),
        volume: first_number(values, &["5. volume", "6. volume", "volume"]) as i64,
    }
}

/// Rows for a table widget, each flattened.
pub fn table_rows(value: &Value) -> Vec<FieldMap> {
    let rows: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => object_rows(obj),
        other => vec![other.clone()],
    };
    rows.iter().map(flatten).collect()
}

fn object_rows(obj: &Map<String, Value>) -> Vec<Value> {
    for key in ["top_gainers", "top_losers"] {
        if let Some(Value::Array(items)) = obj.get(key) {
            return items.clone();
        }
    }

    if let Some(Value::Object(series)) = time_series_key(obj).and_then(|k| obj.get(k)) {
        return dated_rows(series);
    }

    if let Some(items) = obj.values().find_map(Value::as_array) {
        return items.clone();
    }

    if has_date_keys(obj) {
        return dated_rows(obj);
    }

    vec![Value::Object(obj.clone())]
}

fn dated_rows(series: &Map<String, Value>) -> Vec<Value> {
    series
        .iter()
        .map(|(date, values)| {
            let mut row = Map::new();
            row.insert("date".to_string(), Value::String(date.clone()));
            match values {
                Value::Object(fields) => {
                    row.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                other => {
                    row.insert("value".to_string(), other.clone());
                }
            }
            Value::Object(row)
        })
        .collect()
}

fn has_date_keys(obj: &Map<String, Value>) -> bool {
    obj.keys().any(|k| looks_like_date(k))
}

// YYYY-MM-DD prefix
fn looks_like_date(key: &str) -> bool {
    key.get(..10)
        .is_some_and(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").is_ok())
}

fn first_string(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn first_number(item: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .map(number_of)
        .find(|n| *n != 0.0)
        .unwrap_or(0.0)
}

fn number_of(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
