// JSON file repository implementation
use crate::application::dashboard_repository::DashboardRepository;
use crate::domain::dashboard::{DashboardState, STORAGE_RECORD};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Stores the dashboard as `{ "finboard-storage": { ... } }` in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DashboardRepository for JsonFileRepository {
    async fn load(&self) -> Result<Option<DashboardState>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };

        let mut document: Map<String, Value> = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        let Some(record) = document.remove(STORAGE_RECORD) else {
            tracing::warn!(path = %self.path.display(), "storage file has no dashboard record");
            return Ok(None);
        };

        let state: DashboardState =
            serde_json::from_value(record).context("decoding dashboard record")?;
        tracing::info!(widgets = state.widgets.len(), path = %self.path.display(), "loaded dashboard");
        Ok(Some(state))
    }

    async fn save(&self, state: &DashboardState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let mut document = Map::new();
        document.insert(STORAGE_RECORD.to_string(), serde_json::to_value(state)?);
        let bytes = serde_json::to_vec_pretty(&Value::Object(document))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, bytes)
            .await
            .with_context(|| format!("writing {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;

        tracing::debug!(widgets = state.widgets.len(), "saved dashboard");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dashboard::{ApiKeys, DemoKind};
    use crate::domain::widget::{Widget, WidgetLayout};

    fn sample_state() -> DashboardState {
        let (config, _) = DemoKind::Gainers.config(1);
        DashboardState {
            widgets: vec![Widget {
                layout: WidgetLayout::new(config.id.clone(), 0, 0, 6, 4),
                config,
            }],
            api_keys: ApiKeys {
                alphavantage: "av".to_string(),
                finnhub: "fh".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("missing.json"));

        assert_eq!(repo.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dashboard.json");
        let repo = JsonFileRepository::new(&path);
        let state = sample_state();

        repo.save(&state).await.unwrap();

        assert_eq!(repo.load().await.unwrap(), Some(state));
        assert!(!repo.temp_path().exists());
    }

    #[tokio::test]
    async fn test_file_uses_storage_record_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.json");
        let repo = JsonFileRepository::new(&path);

        repo.save(&sample_state()).await.unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let record = &raw[STORAGE_RECORD];
        assert_eq!(record["apiKeys"]["finnhub"], "fh");
        assert_eq!(record["widgets"][0]["type"], "TABLE");
        assert_eq!(record["widgets"][0]["layout"]["w"], 6);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(JsonFileRepository::new(&path).load().await.is_err());
    }
}
