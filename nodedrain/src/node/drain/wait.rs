use super::error::{self, Result};
use super::evict::Eviction;
use super::Drainer;
use crate::cancel::Cancellation;
use crate::constants::DEFAULT_POD_NAMESPACE;
use crate::node::ClusterClient;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fmt;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{event, instrument, Level};

/// Locates a Pod by namespace and name.
///
/// A name can be reused by a new Pod once the old one is gone, so a key alone does not identify a Pod. The
/// `EvictionSet` pairs each key with the UID of the Pod that was deleted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    pub fn new<S1: Into<String>, S2: Into<String>>(namespace: S1, name: S2) -> Self {
        PodKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_pod(pod: &Pod) -> Self {
        PodKey {
            namespace: pod
                .namespace()
                .unwrap_or_else(|| DEFAULT_POD_NAMESPACE.to_string()),
            name: pod.name_any(),
        }
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Deleted Pods which have not yet been observed to terminate, keyed by location and holding the deleted Pod's UID.
///
/// A Pod deleted without a UID can only be observed to terminate by its absence, since a replacement under the same
/// name cannot be told apart from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionSet {
    pods: BTreeMap<PodKey, Option<String>>,
}

impl EvictionSet {
    pub fn insert(&mut self, key: PodKey, uid: Option<String>) {
        self.pods.insert(key, uid);
    }

    pub fn uid(&self, key: &PodKey) -> Option<&str> {
        self.pods.get(key).and_then(|uid| uid.as_deref())
    }

    pub fn contains(&self, key: &PodKey) -> bool {
        self.pods.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PodKey> {
        self.pods.keys()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }
}

/// How the wait for evicted Pods ended. Both outcomes let the drain proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every evicted Pod was observed gone.
    AllTerminated,
    /// The wait budget ran out while these Pods were still present.
    BudgetElapsed { remaining: Vec<PodKey> },
}

impl<T: ClusterClient> Drainer<T> {
    /// Polls the evicted Pods until all of them have terminated or the eviction's wait budget has elapsed.
    ///
    /// A Pod has terminated once looking it up returns not-found, or returns a Pod with a different UID. The first
    /// check runs immediately, then once every poll interval. Cancellation ends the wait with an error at any point.
    #[instrument(
        skip(self, eviction, cancel),
        fields(
            pods = eviction.evicted.len(),
            wait_budget_secs = eviction.wait_budget.as_secs()
        ),
        err
    )]
    pub async fn wait_for_termination(
        &self,
        node_name: &str,
        eviction: Eviction,
        cancel: &Cancellation,
    ) -> Result<WaitOutcome> {
        let Eviction {
            evicted: mut remaining,
            wait_budget,
        } = eviction;
        // A budget too large to add to the clock never elapses.
        let deadline = Instant::now().checked_add(wait_budget);

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return error::CancelledSnafu { node_name }.fail();
                }
                observed = async {
                    ticker.tick().await;
                    self.observe_terminations(&mut remaining).await
                } => observed?,
            }

            if remaining.is_empty() {
                event!(Level::INFO, "All evicted Pods have terminated.");
                return Ok(WaitOutcome::AllTerminated);
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                let remaining: Vec<PodKey> = remaining.keys().cloned().collect();
                event!(
                    Level::WARN,
                    ?remaining,
                    "Evicted Pods did not terminate within {:.2}s. Proceeding.",
                    wait_budget.as_secs_f64()
                );
                return Ok(WaitOutcome::BudgetElapsed { remaining });
            }
        }
    }

    /// Looks up each remaining Pod once, and drops those which have terminated from the set.
    async fn observe_terminations(&self, set: &mut EvictionSet) -> Result<()> {
        let mut terminated = Vec::new();

        for (key, uid) in set.pods.iter() {
            match self.client.get_pod(&key.namespace, &key.name).await {
                Ok(pod) if uid.is_some() && pod.uid() != *uid => {
                    event!(Level::INFO, pod = %key, "Pod was replaced by a new Pod.");
                    terminated.push(key.clone());
                }
                Ok(_) => {
                    event!(Level::DEBUG, pod = %key, "Pod not yet terminated.");
                }
                Err(e) if e.is_not_found() => {
                    event!(Level::INFO, pod = %key, "Pod terminated.");
                    terminated.push(key.clone());
                }
                Err(source) => {
                    return Err(source)
                        .context(error::WaitForTerminationSnafu { pod: key.clone() });
                }
            }
        }

        for key in terminated {
            set.pods.remove(&key);
        }
        Ok(())
    }
}
