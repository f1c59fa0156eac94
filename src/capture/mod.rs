//! Bit-source input and dataset capture.
//!
//! This module provides the abstraction over random bit sources and the
//! capture of sample datasets for offline entropy assessment. A source is
//! treated as raw material, not as trusted entropy.

mod dataset;
mod sample;
mod source;

pub use dataset::{capture_dataset, DatasetError, DatasetKind, DatasetRecord, DatasetRegistry};
pub use sample::BitSample;
pub use source::{
    build_source, BitSource, OsBitSource, PatternBitSource, SeededBitSource, SourceError,
};
