// External collaborators
//
// The playback core depends on two collaborators it does not implement:
//   - Catalog: item lookup and container enumeration
//   - DecisionEngine: turns (item, offset, capabilities) into a stream plan
//
// In-memory reference implementations back tests and standalone deployments.

pub mod catalog;
pub mod decision;
pub mod error;
pub mod traits;

pub use catalog::InMemoryCatalog;
pub use decision::DirectPlayDecisionEngine;
pub use error::*;
pub use traits::*;
