//! Quoting for values spliced into InfluxQL statements.

/// Double quoted identifier, for measurement and tag names.
pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!(
        "\"{}\"",
        identifier.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

/// Single quoted string literal, for tag values.
pub(crate) fn quote_literal(literal: &str) -> String {
    format!("'{}'", literal.replace('\\', "\\\\").replace('\'', "\\'"))
}
