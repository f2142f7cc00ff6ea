//! # Constants
//!
//! Well-known names shared with the rest of the KubeSphere platform, plus the
//! runtime defaults used by the controller binary.
//!
//! The annotation keys and the secret type are part of the wire contract with
//! the pod injector webhook and the token issuer, so they must not change.

/// Name of this controller. Used as the event reporter and in log spans.
pub const CONTROLLER_NAME: &str = "ks-serviceaccount";

/// Finalizer attached to every managed ServiceAccount
pub const FINALIZER: &str = "finalizers.kubesphere.io/serviceaccount";

/// Secret type of a KubeSphere service account token
pub const SECRET_TYPE_SERVICE_ACCOUNT_TOKEN: &str = "kubesphere.io/service-account-token";

/// Annotation on a token secret naming the ServiceAccount it belongs to
pub const SECRET_SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubesphere.io/service-account.name";

/// Annotation on a pod declaring which ServiceAccount it consumes
pub const POD_SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubesphere.io/serviceaccount-name";

/// Name of the projected volume the pod injector mounts the token through
pub const SERVICE_ACCOUNT_VOLUME_NAME: &str = "kubesphere-service-account";

/// Pod template annotation stamped to force a rolling restart
pub const RESTARTED_AT_ANNOTATION: &str = "kubesphere.io/restartedAt";

/// Event reason recorded after a token secret is provisioned
pub const REASON_SYNCED: &str = "Synced";

/// Event reason recorded when a referenced token secret is missing or invalid
pub const REASON_INVALID_SECRET: &str = "InvalidSecret";

/// Event action for everything emitted from the reconcile loop
pub const ACTION_RECONCILE: &str = "Reconcile";

/// Event note recorded after a token secret is provisioned
pub const MESSAGE_CREATE_SECRET_SUCCESSFULLY: &str = "Create token secret successfully";

/// Default maximum number of concurrent reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 2;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Fallback requeue interval when the backoff table cannot be used (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Minimum Fibonacci backoff for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Maximum Fibonacci backoff for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Delay before restarting the watch after the stream ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default tracing filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "ks_serviceaccount_controller=info,kube=warn";
