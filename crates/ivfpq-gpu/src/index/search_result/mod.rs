//! k-NN search output.
//!
//! Search returns flat, query-major arrays:
//! - `labels`: [q0_r0, q0_r1, ..., q0_rk-1, q1_r0, ..., qn_rk-1]
//! - `distances`: same layout, squared L2, ascending within each query
//! - label `-1` with distance `+inf` marks a slot with no match

mod metrics;
mod query;
mod types;


pub use types::{SearchHit, SearchResult};
