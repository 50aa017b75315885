//! Executor layer: statements and the plans that evaluate them.
//!
//! Plans are built per statement against one relation and consumed by
//! evaluation; nothing is materialized between stages.

pub mod plan;
pub mod statement;

pub use plan::{EvalPipeline, EvalPlan};
pub use statement::{QueryResult, Statement, StatementKind};
