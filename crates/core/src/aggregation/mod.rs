//! Aggregation query engine.
//!
//! Read views are [`Pipeline`] values built from the fragments in [`views`]
//! and run by a [`QueryEngine`] over any store backend.

mod engine;
mod pipeline;
pub mod views;

pub use engine::QueryEngine;
pub use pipeline::{Cardinality, Derive, Join, Pipeline, Stage};
