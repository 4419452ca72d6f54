// Dashboard service - Use cases for editing and polling the dashboard
use crate::application::dashboard_repository::DashboardRepository;
use crate::application::errors::WidgetDataError;
use crate::application::scheduler::{RefreshHandler, RefreshScheduler, SchedulerHandle};
use crate::application::widget_data_service::{
    DiscoveryRequest, FieldDiscovery, WidgetDataService, WidgetSnapshot,
};
use crate::application::widget_store::WidgetStore;
use crate::domain::dashboard::{ApiKeys, DemoKind};
use crate::domain::provider::ApiProvider;
use crate::domain::widget::{Widget, WidgetConfig, WidgetLayout, WidgetPatch};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<RwLock<WidgetStore>>,
    repository: Arc<dyn DashboardRepository>,
    data: WidgetDataService,
    scheduler: SchedulerHandle,
    persist_lock: Arc<Mutex<()>>,
}

impl DashboardService {
    /// Load the saved dashboard, start the refresh scheduler and begin polling
    /// every widget.
    pub async fn start(
        repository: Arc<dyn DashboardRepository>,
        data: WidgetDataService,
    ) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let state = repository
            .load()
            .await
            .context("loading saved dashboard")?
            .unwrap_or_default();
        let store = Arc::new(RwLock::new(WidgetStore::from_state(state)));

        let poller = Arc::new(WidgetPoller {
            store: Arc::clone(&store),
            data: data.clone(),
        });
        let (scheduler, task) = RefreshScheduler::spawn(poller);

        let service = Self {
            store,
            repository,
            data,
            scheduler,
            persist_lock: Arc::new(Mutex::new(())),
        };
        service.start_polling().await;
        Ok((service, task))
    }

    /// Schedule every widget that has something to poll.
    pub async fn start_polling(&self) {
        let store = self.store.read().await;
        for widget in store.widgets() {
            self.schedule(&widget.config);
        }
        tracing::info!(widgets = store.widgets().len(), "started widget polling");
    }

    pub async fn list(&self) -> Vec<Widget> {
        self.store.read().await.widgets().to_vec()
    }

    pub async fn get(&self, id: &str) -> Option<Widget> {
        self.store.read().await.get(id).cloned()
    }

    pub async fn create(&self, config: WidgetConfig) -> anyhow::Result<Widget> {
        let widget = self.store.write().await.create(config);
        let widget = self.admit(widget).await?;
        tracing::info!(id = %widget.id(), "created widget");
        Ok(widget)
    }

    pub async fn add_demo_widget(&self, kind: DemoKind) -> anyhow::Result<Widget> {
        let (config, size) = kind.config(chrono::Utc::now().timestamp_millis());
        let widget = self.store.write().await.create_sized(config, size);
        let widget = self.admit(widget).await?;
        tracing::info!(id = %widget.id(), ?kind, "added demo widget");
        Ok(widget)
    }

    // A new widget only stays if it was saved.
    async fn admit(&self, widget: Widget) -> anyhow::Result<Widget> {
        if let Err(err) = self.persist().await {
            self.store.write().await.remove(widget.id());
            return Err(err);
        }
        self.schedule(&widget.config);
        Ok(widget)
    }

    /// Merge a patch into a widget. Polling restarts only when something it
    /// depends on changed.
    pub async fn update(&self, id: &str, patch: WidgetPatch) -> anyhow::Result<Option<Widget>> {
        let (updated, polling_changed) = {
            let mut store = self.store.write().await;
            let Some(before) = store.get(id).map(|w| w.config.polling_signature()) else {
                return Ok(None);
            };
            let Some(updated) = store.update(id, patch).cloned() else {
                return Ok(None);
            };
            let changed = updated.config.polling_signature() != before;
            (updated, changed)
        };

        self.persist().await?;
        if polling_changed {
            tracing::debug!(id, "polling inputs changed");
            self.schedule(&updated.config);
        } else {
            self.data.reconfigure(&updated.config);
        }
        Ok(Some(updated))
    }

    pub async fn remove(&self, id: &str) -> anyhow::Result<Option<Widget>> {
        let removed = self.store.write().await.remove(id);
        let Some(removed) = removed else {
            return Ok(None);
        };
        self.scheduler.cancel(id);
        self.data.forget(id);
        self.persist().await?;
        tracing::info!(id, "removed widget");
        Ok(Some(removed))
    }

    pub async fn apply_layout(&self, layouts: &[WidgetLayout]) -> anyhow::Result<usize> {
        let applied = self.store.write().await.apply_layout(layouts);
        if applied > 0 {
            self.persist().await?;
        }
        Ok(applied)
    }

    /// Store a provider key. Widgets are re-polled so the key takes effect.
    pub async fn set_api_key(&self, provider: ApiProvider, key: String) -> anyhow::Result<bool> {
        if !self.store.write().await.set_api_key(provider, key) {
            return Ok(false);
        }
        self.persist().await?;
        self.start_polling().await;
        Ok(true)
    }

    /// Current snapshot, fetching once if the widget has never been loaded.
    pub async fn widget_data(&self, id: &str) -> Result<WidgetSnapshot, WidgetDataError> {
        let (config, keys) = self.widget_context(id).await?;
        match self.data.snapshot(id) {
            Some(snapshot) => Ok(snapshot),
            None => Ok(self.data.refresh(&config, &keys, false).await),
        }
    }

    /// Manual refresh; bypasses the cache for this single call.
    pub async fn refresh_widget(&self, id: &str) -> Result<WidgetSnapshot, WidgetDataError> {
        let (config, keys) = self.widget_context(id).await?;
        Ok(self.data.refresh(&config, &keys, true).await)
    }

    pub async fn discover(&self, request: DiscoveryRequest) -> Result<FieldDiscovery, WidgetDataError> {
        let keys = self.store.read().await.api_keys().clone();
        self.data.discover(request, &keys).await
    }

    async fn widget_context(&self, id: &str) -> Result<(WidgetConfig, ApiKeys), WidgetDataError> {
        let store = self.store.read().await;
        let widget = store
            .get(id)
            .ok_or_else(|| WidgetDataError::UnknownWidget(id.to_string()))?;
        Ok((widget.config.clone(), store.api_keys().clone()))
    }

    fn schedule(&self, config: &WidgetConfig) {
        if config.is_configured() || config.is_watchlist() {
            self.scheduler
                .schedule(&config.id, Duration::from_secs(config.refresh_interval));
        } else {
            self.scheduler.cancel(&config.id);
        }
    }

    // Serialized so the newest state is always the last one written.
    async fn persist(&self) -> anyhow::Result<()> {
        let _guard = self.persist_lock.lock().await;
        let state = self.store.read().await.to_state();
        self.repository
            .save(&state)
            .await
            .context("saving dashboard")
    }
}

/// Scheduler callback that refreshes one widget from the store.
struct WidgetPoller {
    store: Arc<RwLock<WidgetStore>>,
    data: WidgetDataService,
}

#[async_trait]
impl RefreshHandler for WidgetPoller {
    async fn refresh(&self, widget_id: &str) {
        let context = {
            let store = self.store.read().await;
            store
                .get(widget_id)
                .map(|w| (w.config.clone(), store.api_keys().clone()))
        };
        let Some((config, keys)) = context else {
            tracing::debug!(widget_id, "skipping refresh for removed widget");
            return;
        };
        self.data.refresh(&config, &keys, false).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::fetch_cache::tests::FakeSource;
    use crate::application::fetch_cache::FetchCache;
    use crate::application::json_source::JsonSource;
    use crate::domain::dashboard::DashboardState;
    use crate::domain::widget::WidgetType;
    use crate::infrastructure::config::WatchlistSettings;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    pub(crate) struct MemoryRepository {
        pub saved: StdMutex<Option<DashboardState>>,
        pub saves: StdMutex<usize>,
        pub failing: AtomicBool,
    }

    #[async_trait]
    impl DashboardRepository for MemoryRepository {
        async fn load(&self) -> anyhow::Result<Option<DashboardState>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn save(&self, state: &DashboardState) -> anyhow::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            *self.saved.lock().unwrap() = Some(state.clone());
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    pub(crate) async fn service_with(
        source: &Arc<FakeSource>,
        repository: &Arc<MemoryRepository>,
    ) -> DashboardService {
        let cache = Arc::new(FetchCache::new(Arc::clone(source) as Arc<dyn JsonSource>, 64));
        let data = WidgetDataService::new(cache, WatchlistSettings::default());
        let (service, _task) = DashboardService::start(
            Arc::clone(repository) as Arc<dyn DashboardRepository>,
            data,
        )
        .await
        .unwrap();
        service
    }

    pub(crate) fn card(id: &str, interval: u64) -> WidgetConfig {
        WidgetConfig::new(
            id.to_string(),
            WidgetType::Card,
            "Card".to_string(),
            format!("https://api.test/{id}"),
            interval,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_are_persisted() {
        let source = Arc::new(FakeSource::default());
        let repository = Arc::new(MemoryRepository::default());
        let service = service_with(&source, &repository).await;

        service.create(card("a", 60)).await.unwrap();
        service.create(card("b", 60)).await.unwrap();
        service
            .apply_layout(&[WidgetLayout::new("b".to_string(), 0, 9, 3, 3)])
            .await
            .unwrap();
        service.remove("a").await.unwrap();

        let saved = repository.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.widgets.len(), 1);
        assert_eq!(saved.widgets[0].layout.y, 9);
        assert_eq!(*repository.saves.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_ids_are_noops() {
        let source = Arc::new(FakeSource::default());
        let repository = Arc::new(MemoryRepository::default());
        let service = service_with(&source, &repository).await;

        assert!(service.update("ghost", WidgetPatch::default()).await.unwrap().is_none());
        assert!(service.remove("ghost").await.unwrap().is_none());
        assert_eq!(service.apply_layout(&[]).await.unwrap(), 0);
        assert!(matches!(
            service.widget_data("ghost").await,
            Err(WidgetDataError::UnknownWidget(_))
        ));
        assert_eq!(*repository.saves.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_created_widget_is_polled_until_removed() {
        let source = Arc::new(FakeSource::default());
        let repository = Arc::new(MemoryRepository::default());
        let service = service_with(&source, &repository).await;

        service.create(card("a", 10)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(source.call_count(), 3);

        service.remove("a").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_polling_changes_reschedule() {
        let source = Arc::new(FakeSource::default());
        let repository = Arc::new(MemoryRepository::default());
        let service = service_with(&source, &repository).await;

        service.create(card("a", 60)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.call_count(), 1);

        let rename = WidgetPatch {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        service.update("a", rename).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.call_count(), 1);

        let faster = WidgetPatch {
            refresh_interval: Some(3),
            ..Default::default()
        };
        service.update("a", faster).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_changes_apply_to_kept_data() {
        let source = Arc::new(FakeSource::default());
        source.route("https://api.test/a", json!({"x": 1, "y": 2}));
        let repository = Arc::new(MemoryRepository::default());
        let service = service_with(&source, &repository).await;

        service.create(card("a", 3600)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = service.widget_data("a").await.unwrap();
        assert_eq!(before.fields, json!({"x": 1, "y": 2}).as_object().cloned().unwrap());

        let pick = WidgetPatch {
            selected_fields: Some(vec!["y".to_string()]),
            ..Default::default()
        };
        service.update("a", pick).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let after = service.widget_data("a").await.unwrap();
        assert_eq!(after.fields, json!({"y": 2}).as_object().cloned().unwrap());
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_rolls_back_new_widget() {
        let source = Arc::new(FakeSource::default());
        let repository = Arc::new(MemoryRepository::default());
        let service = service_with(&source, &repository).await;

        repository.failing.store(true, Ordering::SeqCst);
        assert!(service.create(card("a", 10)).await.is_err());
        assert!(service.add_demo_widget(DemoKind::Chart).await.is_err());
        assert!(service.list().await.is_empty());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.call_count(), 0);

        repository.failing.store(false, Ordering::SeqCst);
        let created = service.create(card("a", 10)).await.unwrap();
        assert_eq!(created.id(), "a");
        assert_eq!(service.list().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_bypasses_cache() {
        let source = Arc::new(FakeSource::default());
        source.route("https://api.test/a", json!({"price": 1}));
        let repository = Arc::new(MemoryRepository::default());
        let service = service_with(&source, &repository).await;

        service.create(card("a", 300)).await.unwrap();
        let cached = service.widget_data("a").await.unwrap();
        let before = source.call_count();
        let refreshed = service.refresh_widget("a").await.unwrap();

        assert_eq!(cached.data, Some(json!({"price": 1})));
        assert_eq!(refreshed.data, cached.data);
        assert_eq!(source.call_count(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_dashboard_is_restored_and_polled() {
        let source = Arc::new(FakeSource::default());
        let repository = Arc::new(MemoryRepository::default());
        {
            let service = service_with(&source, &repository).await;
            service.add_demo_widget(DemoKind::Fundamentals).await.unwrap();
            service
                .set_api_key(ApiProvider::AlphaVantage, "av".to_string())
                .await
                .unwrap();
        }

        let restored = service_with(&source, &repository).await;
        let widgets = restored.list().await;
        assert_eq!(widgets.len(), 1);
        assert_eq!((widgets[0].layout.w, widgets[0].layout.h), (3, 2));
        assert!(widgets[0].id().starts_with("demo-fundamentals-"));
        assert!(!restored
            .set_api_key(ApiProvider::Unknown, "x".to_string())
            .await
            .unwrap());
    }
}
