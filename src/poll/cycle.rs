//! Polling cycles.
//!
//! A cycle fetches every instance of the current group concurrently, with a
//! staggered start, and waits for all of them before reporting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::{watch, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::fetch::StatusFetcher;
use crate::config::InstanceConfig;
use crate::data::{aggregate, AggregateOptions, HealthTotals, InstanceIdentity, InstanceSummary};
use crate::error::Error;

/// Result of a whole cycle.
pub type CycleOutcome = Result<CycleReport, Error>;

/// State carried from one cycle to the next.
#[derive(Debug, Clone, Default)]
pub struct PollState {
    /// Group polled by the next cycle.
    pub next_group: usize,
    /// When each instance last fetched successfully, keyed by instance id.
    pub last_fetched: HashMap<String, DateTime<Utc>>,
}

impl PollState {
    /// Take the current group index and move the pointer on, wrapping at
    /// `group_count`.
    pub fn advance(&mut self, group_count: usize) -> usize {
        if group_count == 0 {
            return 0;
        }
        let current = self.next_group % group_count;
        self.next_group = (current + 1) % group_count;
        current
    }
}

/// Outcome of one instance within a cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum InstanceReport {
    Ready(InstanceSummary),
    Failed {
        id: String,
        #[serde(serialize_with = "serialize_display")]
        error: Error,
        /// Last successful fetch of this instance in an earlier cycle.
        last_fetched: Option<DateTime<Utc>>,
    },
}

fn serialize_display<S: Serializer>(error: &Error, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl InstanceReport {
    fn failed(id: &str, reason: impl Into<String>) -> Self {
        InstanceReport::Failed {
            id: id.to_string(),
            error: Error::InstanceFetchFailed {
                id: id.to_string(),
                reason: reason.into(),
            },
            last_fetched: None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            InstanceReport::Ready(summary) => &summary.id,
            InstanceReport::Failed { id, .. } => id,
        }
    }

    /// When the shown data was fetched, if it ever was.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        match self {
            InstanceReport::Ready(summary) => Some(summary.fetched_at),
            InstanceReport::Failed { last_fetched, .. } => *last_fetched,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, InstanceReport::Failed { .. })
    }
}

/// Everything one cycle produced, in configuration order.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Index of the polled group.
    pub group: usize,
    pub instances: Vec<InstanceReport>,
    pub completed_at: DateTime<Utc>,
}

impl CycleReport {
    pub fn new(group: usize, instances: Vec<InstanceReport>) -> Self {
        Self {
            group,
            instances,
            completed_at: Utc::now(),
        }
    }

    pub fn summaries(&self) -> impl Iterator<Item = &InstanceSummary> {
        self.instances.iter().filter_map(|report| match report {
            InstanceReport::Ready(summary) => Some(summary),
            InstanceReport::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &InstanceReport> {
        self.instances.iter().filter(|report| report.is_failed())
    }

    /// Service counts summed over every ready instance.
    pub fn totals(&self) -> HealthTotals {
        self.summaries().fold(HealthTotals::default(), |acc, s| HealthTotals {
            total: acc.total + s.totals.total,
            healthy: acc.healthy + s.totals.healthy,
            unmonitored: acc.unmonitored + s.totals.unmonitored,
            failed: acc.failed + s.totals.failed,
        })
    }
}

/// Runs polling cycles over groups of instances.
pub struct Poller {
    fetcher: Arc<dyn StatusFetcher>,
    groups: Vec<Vec<InstanceConfig>>,
    options: AggregateOptions,
    stagger: Duration,
    state: PollState,
}

impl Poller {
    pub fn new(
        fetcher: Arc<dyn StatusFetcher>,
        groups: Vec<Vec<InstanceConfig>>,
        options: AggregateOptions,
        stagger: Duration,
    ) -> Self {
        Self {
            fetcher,
            groups,
            options,
            stagger,
            state: PollState::default(),
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Run one cycle over the current group.
    ///
    /// Waits for every fetch to settle. Failed instances are reported next
    /// to the successful ones; only when every instance failed does the
    /// cycle itself fail.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let group = self.state.advance(self.groups.len());
        let instances = self.groups.get(group).cloned().unwrap_or_default();
        debug!(group, instances = instances.len(), "Starting cycle");

        let mut tasks = JoinSet::new();
        for (index, instance) in instances.iter().cloned().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let options = self.options.clone();
            let delay = self.stagger * index as u32;
            tasks.spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let report = fetch_instance(fetcher.as_ref(), &instance, &options).await;
                (index, report)
            });
        }

        let mut slots: Vec<Option<InstanceReport>> = (0..instances.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => warn!(error = %e, "Fetch task did not complete"),
            }
        }

        let mut reports: Vec<InstanceReport> = slots
            .into_iter()
            .zip(&instances)
            .map(|(slot, instance)| {
                slot.unwrap_or_else(|| {
                    let identity = InstanceIdentity::new(&instance.id, &instance.url);
                    InstanceReport::failed(&identity.id, "fetch task aborted")
                })
            })
            .collect();

        for report in &mut reports {
            match report {
                InstanceReport::Ready(summary) => {
                    self.state
                        .last_fetched
                        .insert(summary.id.clone(), summary.fetched_at);
                }
                InstanceReport::Failed {
                    id,
                    error,
                    last_fetched,
                } => {
                    warn!(error = %error, "Instance failed");
                    *last_fetched = self.state.last_fetched.get(id.as_str()).copied();
                }
            }
        }

        if !reports.is_empty() && reports.iter().all(InstanceReport::is_failed) {
            warn!(group, "Every instance of the cycle failed");
            return Err(Error::AllInstancesFailed);
        }

        let report = CycleReport::new(group, reports);
        info!(
            group,
            ready = report.summaries().count(),
            failed = report.failures().count(),
            "Cycle complete"
        );
        Ok(report)
    }
}

async fn fetch_instance(
    fetcher: &dyn StatusFetcher,
    instance: &InstanceConfig,
    options: &AggregateOptions,
) -> InstanceReport {
    let identity = InstanceIdentity::new(&instance.id, &instance.url)
        .with_noncritical(instance.noncritical.clone())
        .with_show_stats(instance.show_stats);

    let text = match fetcher.fetch(instance).await {
        Ok(text) => text,
        Err(e) => return InstanceReport::failed(&identity.id, e.to_string()),
    };

    let identity = identity.with_fetched_at(Utc::now());
    match aggregate(&text, &identity, options) {
        Ok(summary) => InstanceReport::Ready(summary),
        Err(error) => InstanceReport::Failed {
            id: identity.id,
            error,
            last_fetched: None,
        },
    }
}

/// Run cycles in the background.
///
/// A cycle runs immediately, then every `interval`, or earlier whenever
/// `refresh` is notified. Outcomes are published on `tx`; the loop stops
/// once every receiver is gone.
pub fn spawn_poll_loop(
    mut poller: Poller,
    interval: Duration,
    tx: watch::Sender<Option<CycleOutcome>>,
    refresh: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let outcome = poller.run_cycle().await;
            if tx.send(Some(outcome)).is_err() {
                debug!("No receivers left, stopping poll loop");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = refresh.notified() => debug!("Refresh requested"),
            }
        }
    })
}
