//! Drains workloads off a Kubernetes Node before the Node object is deleted.
//!
//! The entry point is [`node::Drainer`], which runs the protocol against any
//! [`node::ClusterClient`]. [`node::K8SClusterClient`] is the implementation backed by `kube-rs`.
pub mod cancel;
pub mod config;
pub mod constants;
pub mod node;
pub mod retry;
pub mod telemetry;
