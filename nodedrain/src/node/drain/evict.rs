use super::error::{self, Result};
use super::wait::{EvictionSet, PodKey};
use super::Drainer;
use crate::cancel::Cancellation;
use crate::config::DrainConfig;
use crate::constants::{DAEMONSET_KIND, MIRROR_POD_ANNOTATION};
use crate::node::ClusterClient;
use crate::retry::{retry_on, Interrupted, Throttled};

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use snafu::ResultExt;
use tokio::time::Duration;
use tracing::{event, instrument, Level};

/// The Pods deleted from a Node, and how long to wait for them to terminate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eviction {
    pub evicted: EvictionSet,
    pub wait_budget: Duration,
}

impl<T: ClusterClient> Drainer<T> {
    /// Deletes every drainable Pod on the Node.
    ///
    /// Pods which are already gone by the time they are deleted are skipped. Any other failure to delete a Pod
    /// aborts the eviction, leaving the Pods deleted so far to terminate.
    #[instrument(skip(self, cancel), err)]
    pub async fn evict_pods(&self, node_name: &str, cancel: &Cancellation) -> Result<Eviction> {
        let pods = self
            .client
            .list_pods_on_node(node_name)
            .await
            .context(error::FindTargetPodsSnafu { node_name })?;

        let client = &self.client;
        let mut eviction = Eviction::default();
        for pod in filter_pods(pods) {
            let key = PodKey::from_pod(&pod);

            let deleted = retry_on(&self.config.retry, cancel, Throttled, || {
                client.delete_pod(&key.namespace, &key.name)
            })
            .await;

            match deleted {
                Ok(()) => {
                    let allowance = pod_allowance(&self.config, &pod);
                    event!(
                        Level::INFO,
                        pod = %key,
                        allowance_secs = allowance.as_secs(),
                        "Deleted Pod."
                    );
                    let uid = pod.uid();
                    if uid.is_none() {
                        event!(
                            Level::WARN,
                            pod = %key,
                            "Deleted Pod has no UID. Only its absence will count as termination."
                        );
                    }
                    eviction.wait_budget = eviction.wait_budget.max(allowance);
                    eviction.evicted.insert(key, uid);
                }
                Err(Interrupted::Failed(e)) if e.is_not_found() => {
                    event!(Level::INFO, pod = %key, "Pod was already deleted.");
                }
                Err(Interrupted::Failed(source)) => {
                    return Err(source).context(error::DeletePodSnafu { pod: key });
                }
                Err(Interrupted::Cancelled) => {
                    return error::CancelledSnafu { node_name }.fail();
                }
            }
        }

        Ok(eviction)
    }
}

/// Given a list of all pods for a given node, this filters out pods which we do not want to attempt to drain.
/// We skip daemonset and static Mirror pods.
fn filter_pods<I: IntoIterator<Item = Pod>>(pods: I) -> impl Iterator<Item = Pod> {
    pods.into_iter().filter(|pod| {
        // The DaemonSet controller ignores node cordons and would only recreate its Pods here.
        if controller_kind(pod) == Some(DAEMONSET_KIND) {
            event!(
                Level::INFO,
                "Not draining Pod '{}': Pod is member of a DaemonSet",
                pod.name_any()
            );
            return false;
        }

        // Mirror pods belong to the kubelet and go away with the Node.
        if pod.annotations().contains_key(MIRROR_POD_ANNOTATION) {
            event!(
                Level::INFO,
                "Not draining Pod '{}': Pod is a static Mirror Pod",
                pod.name_any()
            );
            return false;
        }

        true
    })
}

/// The kind of the Pod's managing controller, if it has one.
fn controller_kind(pod: &Pod) -> Option<&str> {
    pod.owner_references()
        .iter()
        .find(|reference| reference.controller == Some(true))
        .map(|reference| reference.kind.as_str())
}

/// How long to wait for a deleted Pod to terminate.
///
/// A Pod declaring a termination grace period is given a multiple of that period plus padding. Other Pods get the
/// default allowance. Grace periods too large to represent saturate at `Duration::MAX`.
fn pod_allowance(config: &DrainConfig, pod: &Pod) -> Duration {
    let grace_period_seconds = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.termination_grace_period_seconds);

    match grace_period_seconds {
        Some(seconds) => {
            let grace_period = Duration::from_secs(u64::try_from(seconds).unwrap_or(0));
            grace_period
                .saturating_add(config.grace_period_padding)
                .checked_mul(config.grace_period_multiplier)
                .unwrap_or(Duration::MAX)
        }
        None => config.default_pod_allowance,
    }
}
