//! Computational core of the `halflife` line burndown analyzer.
//!
//! This crate is deliberately free of any git machinery: it contains the
//! ordered interval map that stores per-line provenance, the `File`
//! abstraction built on top of it, the counters that aggregate line events
//! into time-by-age matrices, and the resampling math used to combine two
//! finished analyses. Everything here is single-threaded by design; the
//! driving CLI serializes all mutations (one commit at a time).

pub mod counters;
pub mod file;
pub mod matrix;
pub mod provenance;
pub mod tree;

pub use counters::{GlobalCounter, InteractionMatrix, PeopleCounter};
pub use file::{File, Status};
pub use matrix::{merge_matrices, TimeRange};
pub use provenance::{pack, unpack, AUTHOR_MISSING, DAY_MASK, TOMBSTONE};
pub use tree::{Cursor, IntervalMap, Item};
