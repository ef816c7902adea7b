mod client;
mod drain;
mod error;

pub use self::client::*;
pub use self::drain::{
    error::DrainError, DrainOutcome, DrainRequest, Drainer, Eviction, EvictionSet, PodKey,
    WaitOutcome,
};
pub use self::error::Error as ClusterError;

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// The name a virtual machine was provisioned with.
///
/// Computer names may contain upper case characters, while the Kubernetes Node registered for the machine never
/// does. Use [`ComputerName::to_kubernetes`] to find the Node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputerName(String);

impl ComputerName {
    pub fn new<S: Into<String>>(name: S) -> Self {
        ComputerName(name.into())
    }

    /// The name of the Kubernetes Node object for this machine.
    pub fn to_kubernetes(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for ComputerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ComputerName {
    fn from(name: &str) -> Self {
        ComputerName::new(name)
    }
}

/// The role of the agent pool a Node belongs to.
///
/// Parsing never fails; unknown roles are kept as `Unrecognized` so that the drain itself can reject them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Control plane Nodes.
    Master,
    /// Nodes running cluster infrastructure workloads (routers, registries, monitoring).
    Infra,
    /// Nodes running user workloads.
    Compute,
    Unrecognized(String),
}

impl FromStr for NodeRole {
    type Err = Infallible;

    fn from_str(role: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match role {
            "master" => NodeRole::Master,
            "infra" => NodeRole::Infra,
            "compute" => NodeRole::Compute,
            other => NodeRole::Unrecognized(other.to_string()),
        })
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Infra => write!(f, "infra"),
            NodeRole::Compute => write!(f, "compute"),
            NodeRole::Unrecognized(role) => write!(f, "{}", role),
        }
    }
}
