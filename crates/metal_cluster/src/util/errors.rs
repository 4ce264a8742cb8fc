use std::fmt;
use thiserror::Error;
use tokio::time::Duration;

#[derive(Error, Debug)]
pub enum StdError {
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    #[error("InvalidScope: {0}")]
    InvalidScope(String),

    /// The stored object moved past the resource version a write was based on.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("OwnerNotFound: {0}")]
    OwnerNotFound(String),

    #[error("could not retrieve metal machines for cluster {cluster:?}: {source}")]
    ListMachines {
        cluster: String,
        #[source]
        source: Box<Error>,
    },

    #[error("ReconcilePanicked: {0}")]
    ReconcilePanicked(String),

    /// The pass failed and committing its scope failed as well.
    #[error("reconcile failed: {reconcile}; closing scope also failed: {close}")]
    ScopeClose { reconcile: Box<Error>, close: Box<Error> },
}

impl StdError {
    pub fn metric_label(&self) -> String {
        match self {
            StdError::KubeError(_) => "kubeerror".to_string(),
            StdError::MetadataMissing(_) => "metadatamissing".to_string(),
            StdError::InvalidArgument(_) => "invalidargument".to_string(),
            StdError::InvalidScope(_) => "invalidscope".to_string(),
            StdError::Conflict(_) => "conflict".to_string(),
            StdError::OwnerNotFound(_) => "ownernotfound".to_string(),
            StdError::ListMachines { .. } => "listmachines".to_string(),
            StdError::ReconcilePanicked(_) => "reconcilepanicked".to_string(),
            StdError::ScopeClose { .. } => "scopeclose".to_string(),
        }
    }
}

impl From<kube::Error> for StdError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ref resp) if resp.code == 409 => StdError::Conflict(resp.message.clone()),
            e => StdError::KubeError(e),
        }
    }
}

#[derive(Error, Debug)]
pub struct ErrorWithRequeue {
    pub duration: Duration,
    pub error: StdError,
}

impl ErrorWithRequeue {
    pub fn new(error: StdError, duration: Duration) -> ErrorWithRequeue {
        ErrorWithRequeue { error, duration }
    }

    pub fn metric_label(&self) -> String {
        self.error.metric_label()
    }
}

impl fmt::Display for ErrorWithRequeue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),

    #[error("Error With Requeue: {0}")]
    ErrorWithRequeue(#[source] ErrorWithRequeue),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
            Error::ErrorWithRequeue(e) => e.metric_label(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::StdError(StdError::Conflict(_))
                | Error::ErrorWithRequeue(ErrorWithRequeue {
                    error: StdError::Conflict(_),
                    ..
                })
        )
    }

    /// Attach a retry delay to a conflict so the whole pass is re-queued quickly.
    pub fn requeue_conflict(self, duration: Duration) -> Error {
        match self {
            Error::StdError(e @ StdError::Conflict(_)) => {
                Error::ErrorWithRequeue(ErrorWithRequeue::new(e, duration))
            }
            other => other,
        }
    }

    /// Retry delay carried by the error itself, if any. For a failed pass whose
    /// scope could not be closed either, the close error decides.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Error::ErrorWithRequeue(e) => Some(e.duration),
            Error::StdError(StdError::ScopeClose { reconcile, close }) => {
                close.requeue_after().or_else(|| reconcile.requeue_after())
            }
            Error::StdError(_) => None,
        }
    }

    /// Combine the outcome of a pass with the outcome of closing its scope.
    /// Neither error is dropped.
    pub fn combine(reconcile: Error, close: Error) -> Error {
        Error::StdError(StdError::ScopeClose {
            reconcile: Box::new(reconcile),
            close: Box::new(close),
        })
    }
}

impl From<StdError> for Error {
    fn from(e: StdError) -> Self {
        Error::StdError(e)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
