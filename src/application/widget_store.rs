// Widget store - authoritative widget collection and layout
use crate::domain::dashboard::{ApiKeys, DashboardState};
use crate::domain::layout::find_next_position;
use crate::domain::provider::ApiProvider;
use crate::domain::widget::{Widget, WidgetConfig, WidgetLayout, WidgetPatch, WidgetSize};

/// Ordered widget collection. Every operation is total: unknown ids are no-ops.
#[derive(Debug, Clone, Default)]
pub struct WidgetStore {
    widgets: Vec<Widget>,
    api_keys: ApiKeys,
}

impl WidgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: DashboardState) -> Self {
        let mut widgets = state.widgets;
        for widget in &mut widgets {
            if widget.layout.clamp_to_grid() {
                tracing::warn!(id = %widget.id(), "saved layout was off the grid, clamped");
            }
        }
        Self {
            widgets,
            api_keys: state.api_keys,
        }
    }

    pub fn to_state(&self) -> DashboardState {
        DashboardState {
            widgets: self.widgets.clone(),
            api_keys: self.api_keys.clone(),
        }
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn get(&self, id: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id() == id)
    }

    pub fn api_keys(&self) -> &ApiKeys {
        &self.api_keys
    }

    /// Add a widget sized by its type.
    pub fn create(&mut self, config: WidgetConfig) -> Widget {
        let size = WidgetSize::Standard(config.widget_type);
        self.create_sized(config, size)
    }

    /// Add a widget, placing it in the first free grid slot.
    ///
    /// An empty or already-used id is replaced with a fresh one.
    pub fn create_sized(&mut self, mut config: WidgetConfig, size: WidgetSize) -> Widget {
        if config.id.is_empty() || self.get(&config.id).is_some() {
            let fresh = uuid::Uuid::new_v4().to_string();
            if !config.id.is_empty() {
                tracing::warn!(requested = %config.id, assigned = %fresh, "widget id already in use");
            }
            config.id = fresh;
        }

        let (w, h) = size.dimensions();
        let position = find_next_position(w, h, self.widgets.iter().map(|widget| &widget.layout));
        let widget = Widget {
            layout: WidgetLayout::new(config.id.clone(), position.x, position.y, w, h),
            config,
        };

        tracing::debug!(id = %widget.id(), x = position.x, y = position.y, w, h, "placed widget");
        self.widgets.push(widget.clone());
        widget
    }

    pub fn update(&mut self, id: &str, patch: WidgetPatch) -> Option<&Widget> {
        let widget = self.widgets.iter_mut().find(|w| w.id() == id)?;
        patch.apply_to(widget);
        Some(&*widget)
    }

    pub fn remove(&mut self, id: &str) -> Option<Widget> {
        let idx = self.widgets.iter().position(|w| w.id() == id)?;
        Some(self.widgets.remove(idx))
    }

    /// Overwrite layouts for matching ids, clamped onto the grid. Returns how
    /// many widgets changed.
    pub fn apply_layout(&mut self, layouts: &[WidgetLayout]) -> usize {
        let mut applied = 0;
        for widget in &mut self.widgets {
            if let Some(layout) = layouts.iter().find(|l| l.i == widget.config.id) {
                let mut layout = layout.clone();
                if layout.clamp_to_grid() {
                    tracing::debug!(id = %layout.i, "clamped layout onto grid");
                }
                widget.layout = layout;
                applied += 1;
            }
        }
        applied
    }

    pub fn set_api_key(&mut self, provider: ApiProvider, key: String) -> bool {
        self.api_keys.set(provider, key)
    }
}
