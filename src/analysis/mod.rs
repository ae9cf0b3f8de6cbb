//! # Taint Analysis
//!
//! The analysis pipeline for one compilation unit:
//!
//! 1. [`taint`] walks each named function (and its closures) and collects
//!    sink candidates plus observed calls.
//! 2. [`bestfit`] picks one sink per ambiguous statement, memoized per
//!    enclosing function.
//! 3. [`propagate`] runs the interprocedural fixed point over call-graph
//!    components and derives chained findings.

pub mod bestfit;
pub mod propagate;
pub mod taint;

pub use bestfit::{BestFitCache, ResolvedSink};
pub use propagate::{Propagator, SinkReach, TaintSummary};
pub use taint::{
    ObservedCall, SinkCandidate, StmtId, TaintOrigin, TaintState, TaintTag, TaintTracker,
    TaintValue, TrackedFunction,
};
