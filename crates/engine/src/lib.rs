//! Fleet script-execution engine.
//!
//! Orchestrates cross-account script runs: credentials come from
//! `fleetrun-credential`, transports are the trait seams in
//! `fleetrun-core`, and this crate supplies the dispatch retry policy,
//! per-execution tracking, and batch coordination on top. The public
//! surface is [`ScriptEngine`].

pub mod backoff;
pub mod batch;
pub mod dispatcher;
pub mod engine;
pub mod sink;
pub mod tracker;

pub use engine::{BatchRequest, ScriptEngine};
pub use sink::{ExecutionSink, LogSink, NoopSink};
