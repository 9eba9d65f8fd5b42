use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Resolves to the number of hosts that produced a valid value in the current cycle.
pub const HOST_COUNT_SENTINEL: &str = "$#";

const COUNTER_OPEN: &str = "$(";
const COUNTER_CLOSE: char = ')';

/// Full-width parentheses are a common input mistake and are rejected outright.
const DISALLOWED_CHARACTERS: [char; 2] = ['（', '）'];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Disallowed character '{0}' in expression")]
    DisallowedCharacter(char),
    #[error("Malformed counter reference in expression: {0}")]
    MalformedCounter(String),
    #[error("Unsupported operator '{0}', only '+' and '-' are allowed")]
    UnsupportedOperator(char),
    #[error("Expression is neither a number nor '{HOST_COUNT_SENTINEL}': {0:?}")]
    InvalidLiteral(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
        }
    }

    pub fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Operator::Add => lhs + rhs,
            Operator::Sub => lhs - rhs,
        }
    }
}

/// A sum or difference of per-host counters.
///
/// Holds `N` operands and `N - 1` operators, the first operand is implicitly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSum {
    operands: Vec<String>,
    operators: Vec<Operator>,
}

impl CounterSum {
    /// Returns [None] unless there is at least one operand and exactly one operator fewer than
    /// operands.
    pub fn new(operands: Vec<String>, operators: Vec<Operator>) -> Option<Self> {
        if operands.is_empty() || operators.len() + 1 != operands.len() {
            return None;
        }

        Some(Self {
            operands,
            operators,
        })
    }

    pub fn operands(&self) -> &[String] {
        &self.operands
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }
}

impl Display for CounterSum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.operators[i - 1].as_char())?;
            }
            write!(f, "{COUNTER_OPEN}{operand}{COUNTER_CLOSE}")?;
        }
        Ok(())
    }
}

/// One side of an aggregation ratio.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A constant, used as is.
    Literal(f64),
    /// [HOST_COUNT_SENTINEL].
    HostCount,
    /// Evaluated per host and summed over the hosts where it is valid.
    Counters(CounterSum),
}

impl Expression {
    /// Clean, validate and parse a raw expression.
    pub fn parse(raw: &str) -> Result<Self, ExpressionError> {
        let cleaned = clean(raw);
        validate(&cleaned)?;
        Self::parse_cleaned(&cleaned)
    }

    /// Parse an expression that has already been through [clean] and [validate].
    pub fn parse_cleaned(cleaned: &str) -> Result<Self, ExpressionError> {
        if !needs_computation(cleaned) {
            if cleaned == HOST_COUNT_SENTINEL {
                return Ok(Expression::HostCount);
            }

            return cleaned
                .parse::<f64>()
                .map(Expression::Literal)
                .map_err(|_| ExpressionError::InvalidLiteral(cleaned.to_string()));
        }

        let (operands, operators) = parse_counters(cleaned)?;
        let operators = validate_operators(&operators)?;

        CounterSum::new(operands, operators)
            .map(Expression::Counters)
            .ok_or_else(|| ExpressionError::MalformedCounter(cleaned.to_string()))
    }

    pub fn needs_computation(&self) -> bool {
        matches!(self, Expression::Counters(_))
    }

    /// The counters referenced by this expression, empty for literals and the sentinel.
    pub fn counters(&self) -> &[String] {
        match self {
            Expression::Counters(sum) => sum.operands(),
            _ => &[],
        }
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::parse(s)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{value}"),
            Expression::HostCount => f.write_str(HOST_COUNT_SENTINEL),
            Expression::Counters(sum) => write!(f, "{sum}"),
        }
    }
}

/// Remove all whitespace and control characters.
pub fn clean(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect()
}

pub fn validate(expression: &str) -> Result<(), ExpressionError> {
    match expression.chars().find(|c| DISALLOWED_CHARACTERS.contains(c)) {
        Some(c) => Err(ExpressionError::DisallowedCharacter(c)),
        None => Ok(()),
    }
}

/// Whether the expression references any counters. Literals and the sentinel do not.
pub fn needs_computation(expression: &str) -> bool {
    expression.contains(COUNTER_OPEN)
}

/// Split a cleaned expression such as `$(cpu.busy)+$(cpu.idle)-$(cpu.nice)` into its operands and
/// the raw operator characters between them.
///
/// Expressions that reference no counters produce no operands and no operators. Operators are not
/// checked here, see [validate_operators].
pub fn parse_counters(expression: &str) -> Result<(Vec<String>, Vec<char>), ExpressionError> {
    if !needs_computation(expression) {
        return Ok((Vec::new(), Vec::new()));
    }

    let malformed = || ExpressionError::MalformedCounter(expression.to_string());

    let body = expression
        .strip_prefix(COUNTER_OPEN)
        .and_then(|e| e.strip_suffix(COUNTER_CLOSE))
        .ok_or_else(malformed)?;

    // `cpu.busy)+$(cpu.idle)-$(cpu.nice` splits into `cpu.busy)+`, `cpu.idle)-` and `cpu.nice`
    let tokens = body.split(COUNTER_OPEN).collect::<Vec<_>>();
    let (last, leading) = tokens.split_last().ok_or_else(malformed)?;

    let mut operands = Vec::with_capacity(tokens.len());
    let mut operators = Vec::with_capacity(leading.len());
    for token in leading {
        let mut chars = token.chars();
        let operator = chars.next_back().ok_or_else(malformed)?;
        let operand = chars
            .as_str()
            .strip_suffix(COUNTER_CLOSE)
            .ok_or_else(malformed)?;

        operands.push(checked_operand(operand).ok_or_else(malformed)?);
        operators.push(operator);
    }
    operands.push(checked_operand(last).ok_or_else(malformed)?);

    Ok((operands, operators))
}

/// Every operator must be `+` or `-`.
pub fn validate_operators(operators: &[char]) -> Result<Vec<Operator>, ExpressionError> {
    operators
        .iter()
        .map(|c| Operator::from_char(*c).ok_or(ExpressionError::UnsupportedOperator(*c)))
        .collect()
}

fn checked_operand(operand: &str) -> Option<String> {
    if operand.is_empty() || operand.contains(['(', ')', '$']) {
        None
    } else {
        Some(operand.to_string())
    }
}
