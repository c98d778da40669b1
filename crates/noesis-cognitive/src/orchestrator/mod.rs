//! Task orchestration
//!
//! The dispatcher drives cache lookup, capability routing, bounded
//! concurrent module invocation and stats recording. The multi-modal
//! pipeline decomposes composite tasks, fans the sub-tasks through the
//! same dispatch path, and fuses the results.

pub mod dispatcher;
pub mod multimodal;

pub use dispatcher::Dispatcher;
pub use multimodal::{DecomposeFn, Decomposer, Fuser, MultiModalProcessor};
