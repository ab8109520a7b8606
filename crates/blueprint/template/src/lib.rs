//! Blueprint Template - Resolution, validation and payload building
//!
//! Turns a submitted template into a lookup table of definitions and
//! components, checks every cross reference, and renders the payload each
//! component will be provisioned with.
//!
//! ## Stages
//!
//! 1. **Resolve**: follow `$ref.field` references through the lookup table,
//!    bounded by [`MAX_RESOLVE_DEPTH`] and [`MAX_EXPANDED_VALUES`]
//! 2. **Validate**: collect every structural, reference and quantity error
//!    in one pass
//! 3. **Build**: one builder per component kind produces the deployer payload
//! 4. **Account**: sum the CPU, memory and storage the template requests

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod builders;
pub mod existing;
pub mod resolve;
pub mod resources;
pub mod validate;

// Re-export main types
pub use builders::{build_body, component_name, run_tag, BuildError};
pub use existing::{ComponentStore, InMemoryComponentStore};
pub use resolve::{resolve, ResolveError, MAX_EXPANDED_VALUES, MAX_RESOLVE_DEPTH};
pub use resources::{QuantityError, ResourceSummary};
pub use validate::{
    ValidationError, ValidationErrors, ValidationReport, Validator, POPULATED_LATER,
};
