// Streaming dashboard service - Progressive loading over chunked JSON
use crate::application::dashboard_service::DashboardService;
use crate::application::widget_data_service::WidgetSnapshot;
use crate::domain::widget::Widget;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamMessage {
    /// Widget list and layout, sent before any data.
    Skeleton { widgets: Vec<Widget> },
    #[serde(rename_all = "camelCase")]
    WidgetUpdate { widget_id: String, snapshot: WidgetSnapshot },
    #[serde(rename_all = "camelCase")]
    Complete { total_widgets: usize, duration_ms: u64 },
}

#[derive(Clone)]
pub struct StreamingDashboardService {
    dashboard: DashboardService,
}

impl StreamingDashboardService {
    pub fn new(dashboard: DashboardService) -> Self {
        Self { dashboard }
    }

    /// Skeleton first, then one update per widget as its data arrives, then
    /// a completion event once every widget has reported.
    pub async fn stream_dashboard(&self) -> mpsc::Receiver<StreamMessage> {
        let (tx, rx) = mpsc::channel(100);
        let start_time = Instant::now();

        let widgets = self.dashboard.list().await;
        let total_widgets = widgets.len();
        let ids: Vec<String> = widgets.iter().map(|w| w.id().to_string()).collect();

        if tx.send(StreamMessage::Skeleton { widgets }).await.is_err() {
            return rx;
        }

        let mut tasks = JoinSet::new();
        for widget_id in ids {
            let tx = tx.clone();
            let dashboard = self.dashboard.clone();
            tasks.spawn(async move {
                match dashboard.widget_data(&widget_id).await {
                    Ok(snapshot) => {
                        let _ = tx.send(StreamMessage::WidgetUpdate { widget_id, snapshot }).await;
                    }
                    Err(e) => {
                        tracing::debug!(%widget_id, error = %e, "widget dropped from stream");
                    }
                }
            });
        }

        tokio::spawn(async move {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "stream widget task failed");
                }
            }
            let duration_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::debug!(total_widgets, duration_ms, "dashboard stream complete");
            let _ = tx
                .send(StreamMessage::Complete {
                    total_widgets,
                    duration_ms,
                })
                .await;
        });

        rx
    }
}
