// Repository trait for dashboard persistence
use crate::domain::dashboard::DashboardState;
use async_trait::async_trait;

#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// Load the saved dashboard, `None` when nothing has been saved yet
    async fn load(&self) -> anyhow::Result<Option<DashboardState>>;

    /// Replace the saved dashboard
    async fn save(&self, state: &DashboardState) -> anyhow::Result<()>;
}
