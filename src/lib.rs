// THEORY:
// This file is the main entry point for the `nucleo_vision` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the interactive binary).
//
// The primary goal is to export the `AnalysisPipeline` and its associated data
// structures (`AnalysisConfig`, `RunSummary`, etc.) as the clean, high-level
// interface for the entire analysis engine. All the domain-level modules
// (`core_modules`) are encapsulated behind two pipeline surfaces: the
// top-level orchestration in `pipeline`, and the bounded worker pool in
// `parallel_pipeline`.

pub mod core_modules;
pub mod pipeline;
pub mod parallel_pipeline;
