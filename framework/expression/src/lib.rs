//! The formula language used by aggregation definitions.
//!
//! An expression is either a numeric literal, the host count sentinel `$#`, or a sum/difference
//! of per-host counters written as `$(counter.name)`, e.g. `$(cpu.busy)+$(cpu.idle)-$(cpu.guest)`.

mod evaluator;
mod parser;

pub use evaluator::compute;
pub use parser::{
    clean, needs_computation, parse_counters, validate, validate_operators, CounterSum,
    Expression, ExpressionError, Operator, HOST_COUNT_SENTINEL,
};
