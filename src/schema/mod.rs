//! ratio_lens.measurements.v1 input schema
//!
//! This module defines the JSON input accepted by the pipeline: either an
//! envelope carrying the twelve measurements plus unit and subject metadata, or
//! a bare measurement map.

mod adapter;
mod measurement;

pub use adapter::*;
pub use measurement::*;
