//! Probe registry and concurrent fan-out

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::task::JoinError;
use tracing::{debug, instrument, warn};

use super::{HealthProbe, ProbeResult, elapsed_ms};

const SHALLOW_TIMEOUT: Duration = Duration::from_secs(5);
const DEEP_TIMEOUT: Duration = Duration::from_secs(15);

/// Named probes keyed by `(name, deep)`
#[derive(Clone)]
pub struct ProbeRegistry {
    probes: BTreeMap<(String, bool), Arc<dyn HealthProbe>>,
    shallow_timeout: Duration,
    deep_timeout: Duration,
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self {
            probes: BTreeMap::new(),
            shallow_timeout: SHALLOW_TIMEOUT,
            deep_timeout: DEEP_TIMEOUT,
        }
    }

    /// Override the registry-level deadlines applied on top of each probe
    pub fn with_timeouts(mut self, shallow: Duration, deep: Duration) -> Self {
        self.shallow_timeout = shallow;
        self.deep_timeout = deep;
        self
    }

    /// Register a probe, replacing any probe with the same name and class
    pub fn register(&mut self, probe: Arc<dyn HealthProbe>) {
        let key = (probe.name().to_string(), probe.is_deep());
        if self.probes.insert(key, probe).is_some() {
            warn!("replaced an already registered probe");
        }
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Names of the probes in one class
    pub fn names(&self, deep: bool) -> Vec<String> {
        self.probes
            .keys()
            .filter(|(_, d)| *d == deep)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn timeout_for(&self, deep: bool) -> Duration {
        if deep {
            self.deep_timeout
        } else {
            self.shallow_timeout
        }
    }

    /// Run every probe of one class concurrently.
    ///
    /// Returns one result per registered probe, in name order. Probe errors,
    /// panics and timeouts become unhealthy results.
    #[instrument(skip(self))]
    pub async fn run_probes(&self, deep: bool) -> Vec<ProbeResult> {
        let timeout = self.timeout_for(deep);

        let tasks = self
            .probes
            .iter()
            .filter(|((_, d), _)| *d == deep)
            .map(|((name, _), probe)| {
                let name = name.clone();
                let probe = probe.clone();
                async move { run_guarded(name, deep, probe, timeout).await }
            });

        let results = join_all(tasks).await;
        debug!(
            "ran {} probes, {} unhealthy",
            results.len(),
            results.iter().filter(|r| !r.healthy).count()
        );
        results
    }

    /// Run a single probe. `None` when no probe of that name and class exists.
    pub async fn run_probe(&self, name: &str, deep: bool) -> Option<ProbeResult> {
        let probe = self.probes.get(&(name.to_string(), deep))?.clone();
        Some(run_guarded(name.to_string(), deep, probe, self.timeout_for(deep)).await)
    }
}

/// Run one probe in its own task so a panic or a hang stays contained
async fn run_guarded(
    name: String,
    deep: bool,
    probe: Arc<dyn HealthProbe>,
    timeout: Duration,
) -> ProbeResult {
    let start = Instant::now();
    let task = tokio::spawn(async move { probe.check().await });
    let abort = task.abort_handle();

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(mut result))) => {
            result.deep = deep;
            result
        }
        Ok(Ok(Err(e))) => {
            warn!("probe {name} failed: {e}");
            ProbeResult::unhealthy(name, deep, elapsed_ms(start), e.to_string())
        }
        Ok(Err(join_err)) => {
            let message = describe_join_error(join_err);
            warn!("probe {name} aborted: {message}");
            ProbeResult::unhealthy(name, deep, elapsed_ms(start), message)
        }
        Err(_) => {
            abort.abort();
            warn!("probe {name} timed out after {timeout:?}");
            ProbeResult::unhealthy(
                name,
                deep,
                elapsed_ms(start),
                format!("timed out after {}ms", timeout.as_millis()),
            )
        }
    }
}

fn describe_join_error(err: JoinError) -> String {
    if !err.is_panic() {
        return "probe task cancelled".to_string();
    }

    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("probe panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("probe panicked: {s}")
    } else {
        "probe panicked".to_string()
    }
}
