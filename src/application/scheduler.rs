// Refresh scheduler - one task drives every widget's polling interval
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[async_trait]
pub trait RefreshHandler: Send + Sync {
    async fn refresh(&self, widget_id: &str);
}

/// Due times for every polled widget.
///
/// Cancelled or replaced entries stay in the heap and are skipped when they
/// surface; only the entry matching the widget's current generation fires.
#[derive(Debug, Default)]
pub struct RefreshSchedule {
    heap: BinaryHeap<Reverse<(Instant, u64, String)>>,
    active: HashMap<String, (u64, Duration)>,
    next_generation: u64,
}

impl RefreshSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a widget's entry, first firing at `first_due`.
    pub fn schedule(&mut self, widget_id: &str, interval: Duration, first_due: Instant) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.active
            .insert(widget_id.to_string(), (generation, interval.max(Duration::from_secs(1))));
        self.heap
            .push(Reverse((first_due, generation, widget_id.to_string())));
    }

    pub fn cancel(&mut self, widget_id: &str) -> bool {
        self.active.remove(widget_id).is_some()
    }

    pub fn is_scheduled(&self, widget_id: &str) -> bool {
        self.active.contains_key(widget_id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Earliest live deadline, discarding stale heap entries on the way.
    pub fn next_due(&mut self) -> Option<Instant> {
        while let Some(Reverse((due, generation, id))) = self.heap.peek() {
            if self.is_current(id, *generation) {
                return Some(*due);
            }
            self.heap.pop();
        }
        None
    }

    /// Pop every widget due at `now` and reschedule each at `now + interval`.
    pub fn pop_due(&mut self, now: Instant) -> Vec<String> {
        let mut due_ids = Vec::new();
        while let Some(Reverse((due, _, _))) = self.heap.peek() {
            if *due > now {
                break;
            }
            let Some(Reverse((_, generation, id))) = self.heap.pop() else {
                break;
            };
            let Some(&(current, interval)) = self.active.get(&id) else {
                continue;
            };
            if current != generation {
                continue;
            }
            self.heap.push(Reverse((now + interval, generation, id.clone())));
            due_ids.push(id);
        }
        due_ids
    }

    fn is_current(&self, widget_id: &str, generation: u64) -> bool {
        self.active
            .get(widget_id)
            .is_some_and(|(current, _)| *current == generation)
    }
}

#[derive(Debug)]
enum ScheduleCommand {
    Schedule { widget_id: String, interval: Duration },
    Cancel { widget_id: String },
}

/// Cheap handle for adding and cancelling widget polls.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<ScheduleCommand>,
}

impl SchedulerHandle {
    /// Poll `widget_id` now and then every `interval`. Replaces any existing entry.
    pub fn schedule(&self, widget_id: &str, interval: Duration) {
        let command = ScheduleCommand::Schedule {
            widget_id: widget_id.to_string(),
            interval,
        };
        if self.tx.send(command).is_err() {
            tracing::warn!(widget_id, "refresh scheduler has stopped");
        }
    }

    pub fn cancel(&self, widget_id: &str) {
        let command = ScheduleCommand::Cancel {
            widget_id: widget_id.to_string(),
        };
        if self.tx.send(command).is_err() {
            tracing::warn!(widget_id, "refresh scheduler has stopped");
        }
    }
}

pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Start the scheduler task. It runs until every handle is dropped.
    pub fn spawn(handler: Arc<dyn RefreshHandler>) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(handler, rx));
        (SchedulerHandle { tx }, task)
    }
}

async fn run(handler: Arc<dyn RefreshHandler>, mut rx: mpsc::UnboundedReceiver<ScheduleCommand>) {
    let mut schedule = RefreshSchedule::new();

    loop {
        let deadline = schedule.next_due();
        tokio::select! {
            command = rx.recv() => match command {
                Some(ScheduleCommand::Schedule { widget_id, interval }) => {
                    tracing::debug!(%widget_id, interval_secs = interval.as_secs(), "scheduling widget");
                    schedule.schedule(&widget_id, interval, Instant::now());
                }
                Some(ScheduleCommand::Cancel { widget_id }) => {
                    if schedule.cancel(&widget_id) {
                        tracing::debug!(%widget_id, "cancelled widget polling");
                    }
                }
                None => break,
            },
            () = wait_until(deadline) => {
                for widget_id in schedule.pop_due(Instant::now()) {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler.refresh(&widget_id).await;
                    });
                }
            }
        }
    }

    tracing::info!("refresh scheduler stopped");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
