use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

// HTTP status codes the drain protocol treats specially.
const NOT_FOUND: u16 = 404;
const CONFLICT: u16 = 409;
const TOO_MANY_REQUESTS: u16 = 429;

/// Errors returned by a `ClusterClient`. Each variant names the object the failed call was made against.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to get Node '{}': '{}'", node_name, source))]
    GetNode {
        source: kube::Error,
        node_name: String,
    },

    #[snafu(display("Unable to update Node '{}': '{}'", node_name, source))]
    UpdateNode {
        source: kube::Error,
        node_name: String,
    },

    #[snafu(display("Unable to delete Node '{}': '{}'", node_name, source))]
    DeleteNode {
        source: kube::Error,
        node_name: String,
    },

    #[snafu(display("Unable to list Pods on Node '{}': '{}'", node_name, source))]
    ListPods {
        source: kube::Error,
        node_name: String,
    },

    #[snafu(display("Unable to get Pod '{}/{}': '{}'", namespace, name, source))]
    GetPod {
        source: kube::Error,
        namespace: String,
        name: String,
    },

    #[snafu(display("Unable to delete Pod '{}/{}': '{}'", namespace, name, source))]
    DeletePod {
        source: kube::Error,
        namespace: String,
        name: String,
    },
}

impl Error {
    fn kube_error(&self) -> &kube::Error {
        match self {
            Self::GetNode { source, .. }
            | Self::UpdateNode { source, .. }
            | Self::DeleteNode { source, .. }
            | Self::ListPods { source, .. }
            | Self::GetPod { source, .. }
            | Self::DeletePod { source, .. } => source,
        }
    }

    /// The HTTP status code of the API server's response, if the call got that far.
    pub fn status_code(&self) -> Option<u16> {
        match self.kube_error() {
            kube::Error::Api(response) => Some(response.code),
            _ => None,
        }
    }

    /// The object does not exist (anymore).
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(NOT_FOUND)
    }

    /// A write lost an optimistic-concurrency race against another writer.
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(CONFLICT)
    }

    /// The API server is throttling requests.
    pub fn is_too_many_requests(&self) -> bool {
        self.status_code() == Some(TOO_MANY_REQUESTS)
    }
}
