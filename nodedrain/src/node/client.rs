use super::error::{self, Result};
use crate::constants::POD_NODE_NAME_FIELD;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::ResourceExt;
use snafu::ResultExt;
use std::sync::Arc;
use tracing::instrument;

#[cfg(any(feature = "mockall", test))]
pub use self::mock::MockClusterClient;

#[async_trait]
/// A trait providing the slice of the Kubernetes API needed to drain a Node. This is provided as a trait
/// in order to allow mocks to be used for testing purposes.
pub trait ClusterClient: Clone + Sized + Send + Sync {
    /// Fetch the Node with the given name.
    async fn get_node(&self, node_name: &str) -> Result<Node>;
    /// Replace a Node. The write is rejected with a conflict if `node` is not based on the latest resourceVersion.
    async fn update_node(&self, node: &Node) -> Result<Node>;
    async fn delete_node(&self, node_name: &str) -> Result<()>;
    /// List the Pods bound to the given Node, across all namespaces.
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>>;
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;
}

#[cfg(any(feature = "mockall", test))]
pub mod mock {
    use super::*;
    use mockall::{mock, predicate::*};

    mock! {
        /// A Mock ClusterClient for use in tests.
        pub ClusterClient {}
        #[async_trait]
        impl ClusterClient for ClusterClient {
            async fn get_node(&self, node_name: &str) -> Result<Node>;
            async fn update_node(&self, node: &Node) -> Result<Node>;
            async fn delete_node(&self, node_name: &str) -> Result<()>;
            async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>>;
            async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;
            async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;
        }

        impl Clone for ClusterClient {
            fn clone(&self) -> Self;
        }
    }
}

#[async_trait]
impl<T> ClusterClient for Arc<T>
where
    T: ClusterClient,
{
    async fn get_node(&self, node_name: &str) -> Result<Node> {
        (**self).get_node(node_name).await
    }

    async fn update_node(&self, node: &Node) -> Result<Node> {
        (**self).update_node(node).await
    }

    async fn delete_node(&self, node_name: &str) -> Result<()> {
        (**self).delete_node(node_name).await
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        (**self).list_pods_on_node(node_name).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        (**self).get_pod(namespace, name).await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        (**self).delete_pod(namespace, name).await
    }
}

#[derive(Clone)]
/// Concrete implementation of the `ClusterClient` trait. This implementation will almost
/// certainly be used in any case that isn't a unit test.
pub struct K8SClusterClient {
    k8s_client: kube::client::Client,
}

impl K8SClusterClient {
    pub fn new(k8s_client: kube::client::Client) -> Self {
        K8SClusterClient { k8s_client }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.k8s_client.clone())
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.k8s_client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterClient for K8SClusterClient {
    #[instrument(skip(self))]
    async fn get_node(&self, node_name: &str) -> Result<Node> {
        self.nodes().get(node_name).await.context(error::GetNodeSnafu {
            node_name: node_name.to_string(),
        })
    }

    #[instrument(skip(self, node), fields(node_name = %node.name_any()), err)]
    async fn update_node(&self, node: &Node) -> Result<Node> {
        let node_name = node.name_any();
        self.nodes()
            .replace(&node_name, &PostParams::default(), node)
            .await
            .context(error::UpdateNodeSnafu { node_name })
    }

    #[instrument(skip(self), err)]
    async fn delete_node(&self, node_name: &str) -> Result<()> {
        self.nodes()
            .delete(node_name, &DeleteParams::default())
            .await
            .context(error::DeleteNodeSnafu {
                node_name: node_name.to_string(),
            })?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::all(self.k8s_client.clone());
        let field_selector = format!("{}={}", POD_NODE_NAME_FIELD, node_name);

        let pod_list = pods
            .list(&ListParams::default().fields(&field_selector))
            .await
            .context(error::ListPodsSnafu {
                node_name: node_name.to_string(),
            })?;

        Ok(pod_list.items)
    }

    #[instrument(skip(self))]
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods(namespace)
            .get(name)
            .await
            .context(error::GetPodSnafu {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .context(error::DeletePodSnafu {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        Ok(())
    }
}
