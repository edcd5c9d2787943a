//! Conflict-safe updates of upstream resources.

mod coordinator;
mod merge;

pub use coordinator::{AddressKind, Mutation, MutationCoordinator, MutationOutcome, MutationState};
pub use merge::{PathOp, PathOperation, apply_operations, merge_changes};
