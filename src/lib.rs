#![forbid(unsafe_code)]

//! Harvests public data about a single video: metadata, a bounded set of
//! top-level comments, the caption track list, and caption text.

pub mod assembler;
pub mod captions;
pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod persist;
pub mod transport;
pub mod youtube;

#[cfg(test)]
mod test_support;
