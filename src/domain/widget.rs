// Widget domain model
use super::layout::{GRID_COLUMNS, MAX_GRID_ROW, MAX_WIDGET_HEIGHT};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_KEY_PARAM: &str = "apikey";
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WidgetType {
    Card,
    Table,
    Chart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Query,
    Header,
}

/// Default grid footprint for a new widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetSize {
    Standard(WidgetType),
    /// Compact card used for company fundamentals.
    Fundamentals,
}

impl WidgetSize {
    /// Returns `(width, height)` in grid units.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            WidgetSize::Standard(WidgetType::Table | WidgetType::Chart) => (6, 4),
            WidgetSize::Standard(WidgetType::Card) => (3, 3),
            WidgetSize::Fundamentals => (3, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    /// Assigned by the store when empty.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub widget_type: WidgetType,
    pub title: String,
    #[serde(default)]
    pub api_endpoint: String,
    pub refresh_interval: u64,
    #[serde(default)]
    pub selected_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchlist_symbols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_location: Option<ApiKeyLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_param_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_header_name: Option<String>,
}

impl WidgetConfig {
    pub fn new(
        id: String,
        widget_type: WidgetType,
        title: String,
        api_endpoint: String,
        refresh_interval: u64,
    ) -> Self {
        Self {
            id,
            widget_type,
            title,
            api_endpoint,
            refresh_interval,
            selected_fields: Vec::new(),
            symbol: None,
            watchlist_symbols: None,
            api_key: None,
            api_key_location: None,
            api_key_param_name: None,
            api_key_header_name: None,
        }
    }

    /// Watchlist widgets ignore `widget_type` when rendering.
    pub fn is_watchlist(&self) -> bool {
        self.watchlist_symbols.is_some()
    }

    pub fn is_configured(&self) -> bool {
        !self.api_endpoint.trim().is_empty()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            key: self.api_key.clone().filter(|k| !k.is_empty()),
            location: self.api_key_location.unwrap_or_default(),
            param_name: self
                .api_key_param_name
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY_PARAM.to_string()),
            header_name: self
                .api_key_header_name
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
        }
    }

    /// Everything that affects what the polling loop fetches and how often.
    pub fn polling_signature(&self) -> PollingSignature {
        PollingSignature {
            api_endpoint: self.api_endpoint.clone(),
            refresh_interval: self.refresh_interval,
            credentials: self.credentials(),
            watchlist_symbols: self.watchlist_symbols.clone(),
        }
    }
}

/// Authentication material for a single endpoint. At most one placement is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: Option<String>,
    pub location: ApiKeyLocation,
    pub param_name: String,
    pub header_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingSignature {
    api_endpoint: String,
    refresh_interval: u64,
    credentials: Credentials,
    watchlist_symbols: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    #[serde(flatten)]
    pub config: WidgetConfig,
    pub layout: WidgetLayout,
}

impl Widget {
    pub fn id(&self) -> &str {
        &self.config.id
    }
}

/// A widget's rectangle on the grid. `i` is the owning widget id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetLayout {
    pub i: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl WidgetLayout {
    pub fn new(i: String, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { i, x, y, w, h }
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    /// Pull a client-supplied rectangle back onto the grid.
    ///
    /// Width is kept within the columns and the rectangle is shifted left to
    /// fit; height and row are capped. Returns whether anything changed.
    pub fn clamp_to_grid(&mut self) -> bool {
        let before = (self.x, self.y, self.w, self.h);
        self.w = self.w.clamp(1, GRID_COLUMNS);
        self.x = self.x.min(GRID_COLUMNS - self.w);
        self.h = self.h.clamp(1, MAX_WIDGET_HEIGHT);
        self.y = self.y.min(MAX_GRID_ROW);
        before != (self.x, self.y, self.w, self.h)
    }
}

/// Partial update for a widget. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPatch {
    #[serde(rename = "type")]
    pub widget_type: Option<WidgetType>,
    pub title: Option<String>,
    pub api_endpoint: Option<String>,
    pub refresh_interval: Option<u64>,
    pub selected_fields: Option<Vec<String>>,
    pub symbol: Option<String>,
    pub watchlist_symbols: Option<Vec<String>>,
    pub api_key: Option<String>,
    pub api_key_location: Option<ApiKeyLocation>,
    pub api_key_param_name: Option<String>,
    pub api_key_header_name: Option<String>,
    pub layout: Option<WidgetLayout>,
}

impl WidgetPatch {
    pub fn apply_to(self, widget: &mut Widget) {
        let config = &mut widget.config;
        if let Some(widget_type) = self.widget_type {
            config.widget_type = widget_type;
        }
        if let Some(title) = self.title {
            config.title = title;
        }
        if let Some(api_endpoint) = self.api_endpoint {
            config.api_endpoint = api_endpoint;
        }
        if let Some(refresh_interval) = self.refresh_interval {
            config.refresh_interval = refresh_interval;
        }
        if let Some(selected_fields) = self.selected_fields {
            config.selected_fields = selected_fields;
        }
        if self.symbol.is_some() {
            config.symbol = self.symbol;
        }
        if self.watchlist_symbols.is_some() {
            config.watchlist_symbols = self.watchlist_symbols;
        }
        if self.api_key.is_some() {
            config.api_key = self.api_key;
        }
        if self.api_key_location.is_some() {
            config.api_key_location = self.api_key_location;
        }
        if self.api_key_param_name.is_some() {
            config.api_key_param_name = self.api_key_param_name;
        }
        if self.api_key_header_name.is_some() {
            config.api_key_header_name = self.api_key_header_name;
        }
        if let Some(mut layout) = self.layout {
            layout.i = config.id.clone();
            layout.clamp_to_grid();
            widget.layout = layout;
        }
    }
}
