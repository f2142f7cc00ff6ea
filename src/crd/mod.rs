//! # Resource Types
//!
//! The KubeSphere `ServiceAccount` (`kubesphere.io/v1alpha1`) managed by this
//! controller.
//!
//! The CRD itself is installed by KubeSphere; this crate only reads and
//! updates instances of it.

mod service_account;

pub use service_account::{ServiceAccount, API_VERSION, GROUP, KIND, PLURAL, VERSION};
