//! Link Graph
//!
//! This module implements the structural side of the engine: wiring outputs
//! to inputs, setting inputs from outside, and the bookkeeping every
//! structural change carries with it.
//!
//! # Overview
//!
//! A link connects an output key of one instance to an input key of another.
//! Each input slot holds at most one link; linking an occupied slot replaces
//! the previous link. Cycles are allowed.
//!
//! Two pieces of derived state follow every change:
//!
//! - **Liveness**: an instance is live when none of its inputs block it. An
//!   input blocks when it is linked from a blocked producer, or when it is
//!   unlinked, required and absent. Liveness flips cascade downstream along
//!   every link.
//!
//! - **Dependencies**: each instance caches the set of instances upstream of
//!   it. The scheduler uses these sets to run producers before consumers.
//!
//! # Design Decisions
//!
//! 1. Liveness is a counter per instance, adjusted on every flip, rather than
//!    recomputed. A counter dropping below zero is an invariant violation.
//!
//! 2. Dependency sets grow by union on link and are rebuilt by a breadth-first
//!    walk on unlink. Downstream sets are not shrunk on unlink; they only bias
//!    scheduling order, so a stale superset is harmless.
//!
//! 3. Unlinking an input that has no link is not an error. It still resets
//!    the input to its default.

mod dependency;
mod link;
mod liveness;
