//! The query engine core: consumes a [`ast::Query`], plans it, optimizes
//! the plan against live [`quill_api::GraphStatistics`], and executes it
//! in a batch-streaming fashion over a [`quill_storage::Graph`]
//! (spec.md §4, "Planner → Optimizer → Executor").
//!
//! This crate has no text parser: callers hand it an already-parsed AST
//! (spec.md §4.3 "AST consumed, not produced"). [`query_api`] is the
//! facade most embedders should use; the individual stages (`planner`,
//! `optimizer`, `evaluator`, `executor`) are exposed for callers that need
//! finer control, e.g. an EXPLAIN-style plan viewer.

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod functions;
pub mod optimizer;
pub mod planner;
pub mod query_api;

pub use error::{Error, Result};
pub use query_api::{Params, PreparedQuery, QueryEngine};
