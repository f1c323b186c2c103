use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use sequence::Direction;

use crate::types::{MatchError, ScanOutcome};

/// Metrics observer for identifications and engine builds.
pub trait MatchMetrics: Send + Sync {
    fn record_identify(&self, latency: Duration, strikes: usize, outcome: &ScanOutcome);
    fn record_engine_build(&self, direction: Direction, latency: Duration, result: Result<(), &MatchError>);
}

/// Install or clear the global matcher metrics recorder.
pub fn set_match_metrics(recorder: Option<Arc<dyn MatchMetrics>>) {
    let lock = metrics_lock();
    let mut guard = lock.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn MatchMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn MatchMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn MatchMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}
