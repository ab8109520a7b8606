//! Blueprint Client - Adapters to real collaborators
//!
//! - [`HttpDeployer`]: the deployment API over JSON/HTTP
//! - [`HttpHealthProbe`]: GET-based health probing of provisioned components
//! - [`FileComponentStore`]: existing-component records kept in a JSON file

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod deployer;
pub mod error;
pub mod probe;
pub mod store;

pub use deployer::HttpDeployer;
pub use error::{ClientError, Result};
pub use probe::HttpHealthProbe;
pub use store::FileComponentStore;
