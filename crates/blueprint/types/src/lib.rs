//! Blueprint Types - Core types for declarative network templates
//!
//! A template describes a blockchain network topology (certificate
//! authorities, enrollment identities, MSPs, orderers, peers) as one JSON
//! document whose fields reference each other by symbolic id.
//!
//! ## Key Concepts
//!
//! - **Template**: the submitted document, parsed once into typed parts
//! - **TemplateValue**: a field value, either a literal or a `$ref.field`
//!   reference, tagged at parse time
//! - **LookupTable**: the run-scoped arena every reference resolves against;
//!   provisioned values are written back into it as components complete
//! - **ProgressRecord**: externally persisted state of an asynchronous build

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod ids;
pub mod kind;
pub mod progress;
pub mod table;
pub mod template;
pub mod value;

// Re-export main types
pub use error::{StoreError, TemplateError};
pub use ids::{EntryId, RefId, TxId};
pub use kind::ComponentKind;
pub use progress::{DebugRecord, ProgressRecord, ProgressUpdate, RunStatus};
pub use table::{Entry, EntryOrigin, LookupTable};
pub use template::{ComponentSpec, Definition, Template, SUPPORTED_API_VERSION};
pub use value::{Reference, TemplateValue, REFERENCE_SIGIL};
