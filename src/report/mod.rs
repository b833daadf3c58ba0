//! Report renderers for scan results.
//!
//! - [`terminal`]: colored summary box and outcome tables; respects `--verbose` / `--quiet`.
//!
//! JSON output is the serialized [`crate::models::PipelineResult`] and needs no renderer.

pub mod terminal;
