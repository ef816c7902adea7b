use tokio::time::Duration;

// Annotation placed by the kubelet on the API representation of a static Pod.
pub const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

// Controller kind whose Pods are never drained.
pub const DAEMONSET_KIND: &str = "DaemonSet";

// Namespace assumed for a Pod that arrives without one.
pub const DEFAULT_POD_NAMESPACE: &str = "default";

// Field selector key used to list the Pods bound to a Node.
pub const POD_NODE_NAME_FIELD: &str = "spec.nodeName";

/// How often evicted Pods are checked for termination.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Wait allowance for an evicted Pod which does not declare a termination grace period.
pub const DEFAULT_POD_ALLOWANCE: Duration = Duration::from_secs(30);

// A Pod declaring a grace period `g` is allowed `GRACE_PERIOD_MULTIPLIER * (g + GRACE_PERIOD_PADDING)`.
pub const GRACE_PERIOD_MULTIPLIER: u32 = 3;
pub const GRACE_PERIOD_PADDING: Duration = Duration::from_secs(2);

// Matches the default retry policy of Kubernetes clients: five attempts, ten milliseconds apart.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 5;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(10);
