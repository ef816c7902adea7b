use crate::node::{ClusterError, NodeRole, PodKey};

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, DrainError>;

/// Fatal outcomes of a drain. The Node and its Pods are left in whatever state was reached.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DrainError {
    #[snafu(display("Unable to determine whether Node '{}' exists: '{}'", node_name, source))]
    ResolveNode {
        source: ClusterError,
        node_name: String,
    },

    #[snafu(display("Unrecognized role '{}' for Node '{}'", role, node_name))]
    UnrecognizedRole { role: NodeRole, node_name: String },

    #[snafu(display(
        "Unable to mark Node '{}' as unschedulable={}: '{}'",
        node_name,
        unschedulable,
        source
    ))]
    Cordon {
        source: ClusterError,
        node_name: String,
        unschedulable: bool,
    },

    #[snafu(display("Unable to find drainable Pods for Node '{}': '{}'", node_name, source))]
    FindTargetPods {
        source: ClusterError,
        node_name: String,
    },

    #[snafu(display("Unable to delete Pod '{}': '{}'", pod, source))]
    DeletePod { source: ClusterError, pod: PodKey },

    #[snafu(display("Could not determine if Pod '{}' has terminated: '{}'", pod, source))]
    WaitForTermination { source: ClusterError, pod: PodKey },

    #[snafu(display("Unable to delete Node '{}': '{}'", node_name, source))]
    DeleteNode {
        source: ClusterError,
        node_name: String,
    },

    #[snafu(display("Drain of Node '{}' was cancelled", node_name))]
    Cancelled { node_name: String },
}

impl DrainError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
