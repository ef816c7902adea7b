//! Drains a Kubernetes Node ahead of its removal from the cluster.
//!
//! A drain resolves the Node, gates on its role, cordons it, deletes the Pods running on it, waits a bounded time
//! for them to terminate and finally deletes the Node object. It is safe to drain different Nodes concurrently:
//! the only state shared between drains is the remote API.
//!
//! Unlike `kubectl drain`, Pods are deleted directly rather than through the Eviction API, so
//! PodDisruptionBudgets are not consulted. The wait for terminations is bounded by the largest grace period among
//! the deleted Pods, and a drain whose Pods outlive that budget still completes.
pub mod error;
mod evict;
mod wait;

pub use self::evict::Eviction;
pub use self::wait::{EvictionSet, PodKey, WaitOutcome};

use self::error::{DrainError, Result};
use super::{ClusterClient, ComputerName, NodeRole};
use crate::cancel::Cancellation;
use crate::config::DrainConfig;
use crate::retry::{retry_on, ConflictOrThrottled, Interrupted};

use k8s_openapi::api::core::v1::Node;
use snafu::ResultExt;
use tracing::{event, instrument, Level};

/// One Node to drain, and the role of the pool it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainRequest {
    pub computer_name: ComputerName,
    pub role: NodeRole,
}

impl DrainRequest {
    pub fn new(computer_name: ComputerName, role: NodeRole) -> Self {
        DrainRequest {
            computer_name,
            role,
        }
    }

    pub fn node_name(&self) -> String {
        self.computer_name.to_kubernetes()
    }
}

/// How a successful drain ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The Node did not exist, so there was nothing to do.
    NodeAbsent,
    /// The Node was a control plane Node. It was deleted without evicting anything.
    ControlPlaneSkipped,
    /// The Node's Pods were deleted and waited for, then the Node was deleted.
    Drained {
        evicted: Vec<PodKey>,
        wait: WaitOutcome,
    },
}

/// Runs the drain protocol against a cluster.
#[derive(Clone)]
pub struct Drainer<T: ClusterClient> {
    client: T,
    config: DrainConfig,
}

impl<T: ClusterClient> Drainer<T> {
    pub fn new(client: T, config: DrainConfig) -> Self {
        Drainer { client, config }
    }

    /// Drains the requested Node and deletes it.
    ///
    /// Returns the first fatal error encountered. Nothing is rolled back on failure: the Node may stay cordoned
    /// and some of its Pods may already be deleted.
    #[instrument(skip(self, request, cancel), fields(node_name = %request.node_name(), role = %request.role), err)]
    pub async fn drain_node(
        &self,
        request: &DrainRequest,
        cancel: &Cancellation,
    ) -> Result<DrainOutcome> {
        let node_name = request.node_name();

        if self.resolve_node(&node_name).await?.is_none() {
            event!(Level::INFO, "Node not found, skipping drain.");
            return Ok(DrainOutcome::NodeAbsent);
        }

        let outcome = match &request.role {
            NodeRole::Master => {
                // Control plane Nodes are replaced without evicting their workloads.
                DrainOutcome::ControlPlaneSkipped
            }
            NodeRole::Infra | NodeRole::Compute => {
                self.cordon(&node_name, cancel).await?;

                let eviction = self.evict_pods(&node_name, cancel).await?;
                let evicted = eviction.evicted.keys().cloned().collect();
                let wait = self.wait_for_termination(&node_name, eviction, cancel).await?;

                DrainOutcome::Drained { evicted, wait }
            }
            NodeRole::Unrecognized(_) => {
                return error::UnrecognizedRoleSnafu {
                    role: request.role.clone(),
                    node_name,
                }
                .fail();
            }
        };

        self.delete_node(&node_name).await?;
        event!(Level::INFO, ?outcome, "Node drained and deleted.");

        Ok(outcome)
    }

    /// Looks up the Node, treating its absence as a valid answer.
    async fn resolve_node(&self, node_name: &str) -> Result<Option<Node>> {
        match self.client.get_node(node_name).await {
            Ok(node) => Ok(Some(node)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).context(error::ResolveNodeSnafu { node_name }),
        }
    }

    /// Marks the given node as unschedulable, preventing Pods from being deployed onto it.
    pub async fn cordon(&self, node_name: &str, cancel: &Cancellation) -> Result<()> {
        self.set_unschedulable(node_name, true, cancel).await
    }

    /// Marks the given node as scheduleable, allowing Pods to be deployed onto it.
    pub async fn uncordon(&self, node_name: &str, cancel: &Cancellation) -> Result<()> {
        self.set_unschedulable(node_name, false, cancel).await
    }

    /// Sets `spec.unschedulable` on the Node with a read-modify-write loop.
    ///
    /// A write that loses a race with another writer, or that is throttled, re-reads the Node and tries again, up
    /// to the configured number of attempts.
    #[instrument(skip(self, cancel), err)]
    pub async fn set_unschedulable(
        &self,
        node_name: &str,
        unschedulable: bool,
        cancel: &Cancellation,
    ) -> Result<()> {
        let client = &self.client;
        let result = retry_on(
            &self.config.retry,
            cancel,
            ConflictOrThrottled,
            || async move {
                let mut node = client.get_node(node_name).await?;
                node.spec.get_or_insert_with(Default::default).unschedulable = Some(unschedulable);
                client.update_node(&node).await.map(|_| ())
            },
        )
        .await;

        match result {
            Ok(()) => {
                event!(Level::INFO, unschedulable, "Updated Node schedulability.");
                Ok(())
            }
            Err(Interrupted::Failed(source)) => Err(DrainError::Cordon {
                source,
                node_name: node_name.to_string(),
                unschedulable,
            }),
            Err(Interrupted::Cancelled) => error::CancelledSnafu { node_name }.fail(),
        }
    }

    async fn delete_node(&self, node_name: &str) -> Result<()> {
        self.client
            .delete_node(node_name)
            .await
            .context(error::DeleteNodeSnafu { node_name })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cancel::cancellation;
    use crate::constants::MIRROR_POD_ANNOTATION;
    use crate::node::test_util::{
        api_error, fake_node, fake_pod, get_node_error, with_annotations, with_controller,
    };
    use crate::node::{ClusterError, MockClusterClient};

    use maplit::btreemap;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use tokio::time::{Duration, Instant};

    const NODE_NAME: &str = "vm-000001";

    fn request(role: NodeRole) -> DrainRequest {
        DrainRequest::new(ComputerName::new("VM-000001"), role)
    }

    fn update_node_error(code: u16) -> ClusterError {
        ClusterError::UpdateNode {
            source: api_error(code),
            node_name: NODE_NAME.to_string(),
        }
    }

    fn expect_node_exists(client: &mut MockClusterClient) {
        client
            .expect_get_node()
            .with(eq(NODE_NAME))
            .times(1)
            .returning(|name| Ok(fake_node(name)));
    }

    #[tokio::test]
    async fn test_absent_node_is_drained_trivially() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_node()
            .with(eq(NODE_NAME))
            .times(1)
            .returning(|_| Err(get_node_error(api_error(404))));
        client.expect_update_node().never();
        client.expect_list_pods_on_node().never();
        client.expect_delete_node().never();

        let drainer = Drainer::new(client, DrainConfig::default());
        let outcome = drainer
            .drain_node(&request(NodeRole::Compute), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(outcome, DrainOutcome::NodeAbsent);
    }

    #[tokio::test]
    async fn test_node_lookup_failure_is_surfaced() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_node()
            .times(1)
            .returning(|_| Err(get_node_error(api_error(500))));
        client.expect_delete_node().never();

        let drainer = Drainer::new(client, DrainConfig::default());
        let result = drainer
            .drain_node(&request(NodeRole::Compute), &Cancellation::never())
            .await;

        match result {
            Err(DrainError::ResolveNode { source, node_name }) => {
                assert_eq!(source.status_code(), Some(500));
                assert_eq!(node_name, NODE_NAME);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_control_plane_node_is_deleted_without_eviction() {
        let mut client = MockClusterClient::new();
        expect_node_exists(&mut client);
        client.expect_update_node().never();
        client.expect_list_pods_on_node().never();
        client.expect_delete_pod().never();
        client
            .expect_delete_node()
            .with(eq(NODE_NAME))
            .times(1)
            .returning(|_| Ok(()));

        let drainer = Drainer::new(client, DrainConfig::default());
        let outcome = drainer
            .drain_node(&request(NodeRole::Master), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(outcome, DrainOutcome::ControlPlaneSkipped);
    }

    #[tokio::test]
    async fn test_unrecognized_role_fails_without_mutations() {
        let mut client = MockClusterClient::new();
        expect_node_exists(&mut client);
        client.expect_update_node().never();
        client.expect_list_pods_on_node().never();
        client.expect_delete_pod().never();
        client.expect_delete_node().never();

        let drainer = Drainer::new(client, DrainConfig::default());
        let result = drainer
            .drain_node(
                &request(NodeRole::Unrecognized("etcd".to_string())),
                &Cancellation::never(),
            )
            .await;

        match result {
            Err(DrainError::UnrecognizedRole { role, node_name }) => {
                assert_eq!(role, NodeRole::Unrecognized("etcd".to_string()));
                assert_eq!(node_name, NODE_NAME);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cordon_retries_conflicts() {
        let mut client = MockClusterClient::new();
        let mut seq = Sequence::new();
        for attempt in 0..3 {
            client
                .expect_get_node()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|name| Ok(fake_node(name)));
            let update = client
                .expect_update_node()
                .withf(|node| node.spec.as_ref().unwrap().unschedulable == Some(true))
                .times(1)
                .in_sequence(&mut seq);
            if attempt < 2 {
                update.returning(|_| Err(update_node_error(409)));
            } else {
                update.returning(|node| Ok(node.clone()));
            }
        }

        let drainer = Drainer::new(client, DrainConfig::default());
        drainer
            .cordon(NODE_NAME, &Cancellation::never())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cordon_gives_up_after_bounded_attempts() {
        let mut config = DrainConfig::default();
        config.retry.attempts = 3;

        let mut client = MockClusterClient::new();
        client
            .expect_get_node()
            .times(3)
            .returning(|name| Ok(fake_node(name)));
        client
            .expect_update_node()
            .times(3)
            .returning(|_| Err(update_node_error(409)));

        let drainer = Drainer::new(client, config);
        let result = drainer.cordon(NODE_NAME, &Cancellation::never()).await;

        match result {
            Err(DrainError::Cordon {
                source,
                unschedulable,
                ..
            }) => {
                assert!(source.is_conflict());
                assert!(unschedulable);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cordon_aborts_on_other_errors() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_node()
            .times(1)
            .returning(|name| Ok(fake_node(name)));
        client
            .expect_update_node()
            .times(1)
            .returning(|_| Err(update_node_error(403)));

        let drainer = Drainer::new(client, DrainConfig::default());
        let result = drainer.cordon(NODE_NAME, &Cancellation::never()).await;

        assert!(matches!(result, Err(DrainError::Cordon { .. })));
    }

    #[tokio::test]
    async fn test_uncordon_clears_unschedulable() {
        let mut client = MockClusterClient::new();
        client.expect_get_node().times(1).returning(|name| {
            let mut node = fake_node(name);
            node.spec.as_mut().unwrap().unschedulable = Some(true);
            Ok(node)
        });
        client
            .expect_update_node()
            .withf(|node| node.spec.as_ref().unwrap().unschedulable == Some(false))
            .times(1)
            .returning(|node| Ok(node.clone()));

        let drainer = Drainer::new(client, DrainConfig::default());
        drainer
            .uncordon(NODE_NAME, &Cancellation::never())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_cordon() {
        let (trigger, cancel) = cancellation();
        trigger.cancel();

        let mut client = MockClusterClient::new();
        client
            .expect_get_node()
            .returning(|name| Ok(fake_node(name)));
        client
            .expect_update_node()
            .returning(|_| Err(update_node_error(409)));

        let drainer = Drainer::new(client, DrainConfig::default());
        let result = drainer.cordon(NODE_NAME, &cancel).await;

        assert!(result.unwrap_err().is_cancelled());
    }

    /// A DaemonSet Pod, a mirror Pod and a Deployment Pod are running on the Node. Only the Deployment Pod is
    /// deleted, and the drain waits for it to go away before deleting the Node.
    #[tokio::test(start_paused = true)]
    async fn test_drain_compute_node() {
        let mut client = MockClusterClient::new();
        let mut seq = Sequence::new();

        client
            .expect_get_node()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Ok(fake_node(name)));
        // Cordon.
        client
            .expect_get_node()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Ok(fake_node(name)));
        client
            .expect_update_node()
            .withf(|node| node.spec.as_ref().unwrap().unschedulable == Some(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|node| Ok(node.clone()));
        client
            .expect_list_pods_on_node()
            .with(eq(NODE_NAME))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                let daemonset_pod = with_controller(
                    fake_pod("kube-system", "fluentd-x7k2p", "uid-ds", Some(10)),
                    "DaemonSet",
                );
                let mirror_pod = with_annotations(
                    fake_pod("kube-system", "etcd-vm-000001", "uid-mirror", None),
                    btreemap! { MIRROR_POD_ANNOTATION.to_string() => "abc123".to_string() },
                );
                let deployment_pod = with_controller(
                    fake_pod("web", "frontend-5d8f", "uid-web", Some(30)),
                    "ReplicaSet",
                );
                Ok(vec![daemonset_pod, mirror_pod, deployment_pod])
            });
        client
            .expect_delete_pod()
            .with(eq("web"), eq("frontend-5d8f"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        client
            .expect_get_pod()
            .with(eq("web"), eq("frontend-5d8f"))
            .times(2)
            .in_sequence(&mut seq)
            .returning(|namespace, name| {
                Ok(fake_pod(namespace, name, "uid-web", Some(30)))
            });
        client
            .expect_get_pod()
            .with(eq("web"), eq("frontend-5d8f"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|namespace, name| {
                Err(ClusterError::GetPod {
                    source: api_error(404),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            });
        client
            .expect_delete_node()
            .with(eq(NODE_NAME))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let drainer = Drainer::new(client, DrainConfig::default());
        let start = Instant::now();
        let outcome = drainer
            .drain_node(&request(NodeRole::Compute), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DrainOutcome::Drained {
                evicted: vec![PodKey::new("web", "frontend-5d8f")],
                wait: WaitOutcome::AllTerminated,
            }
        );
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_deletes_node_after_wait_budget() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_node()
            .returning(|name| Ok(fake_node(name)));
        client
            .expect_update_node()
            .returning(|node| Ok(node.clone()));
        client
            .expect_list_pods_on_node()
            .returning(|_| Ok(vec![fake_pod("web", "stuck", "uid-stuck", Some(30))]));
        client.expect_delete_pod().times(1).returning(|_, _| Ok(()));
        client
            .expect_get_pod()
            .returning(|namespace, name| {
                Ok(fake_pod(namespace, name, "uid-stuck", Some(30)))
            });
        client
            .expect_delete_node()
            .with(eq(NODE_NAME))
            .times(1)
            .returning(|_| Ok(()));

        let drainer = Drainer::new(client, DrainConfig::default());
        let start = Instant::now();
        let outcome = drainer
            .drain_node(&request(NodeRole::Infra), &Cancellation::never())
            .await
            .unwrap();

        let stuck = PodKey::new("web", "stuck");
        assert_eq!(
            outcome,
            DrainOutcome::Drained {
                evicted: vec![stuck.clone()],
                wait: WaitOutcome::BudgetElapsed {
                    remaining: vec![stuck]
                },
            }
        );
        assert_eq!(start.elapsed(), Duration::from_secs(96));
    }

    #[tokio::test]
    async fn test_node_deletion_not_found_is_surfaced() {
        let mut client = MockClusterClient::new();
        expect_node_exists(&mut client);
        client.expect_delete_node().times(1).returning(|name| {
            Err(ClusterError::DeleteNode {
                source: api_error(404),
                node_name: name.to_string(),
            })
        });

        let drainer = Drainer::new(client, DrainConfig::default());
        let result = drainer
            .drain_node(&request(NodeRole::Master), &Cancellation::never())
            .await;

        match result {
            Err(DrainError::DeleteNode { source, .. }) => assert!(source.is_not_found()),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
