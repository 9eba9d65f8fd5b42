use cluster_aggregator_model::MetricValues;

use crate::parser::{CounterSum, Operator};

/// Evaluate `operands` combined by `operators` for one host.
///
/// All or nothing: if any referenced counter is missing for the host then the host has no value,
/// even when every other counter is present.
pub fn compute(
    operands: &[String],
    operators: &[Operator],
    host: &str,
    values: &MetricValues,
) -> Option<f64> {
    let (first, rest) = operands.split_first()?;

    let mut total = values.get(host, first)?.value;
    for (operand, operator) in rest.iter().zip(operators) {
        total = operator.apply(total, values.get(host, operand)?.value);
    }

    Some(total)
}

impl CounterSum {
    /// See [compute].
    pub fn compute(&self, host: &str, values: &MetricValues) -> Option<f64> {
        compute(self.operands(), self.operators(), host, values)
    }
}
