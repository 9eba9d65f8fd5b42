//! Helpers for the `metric/key=value,key=value` counter convention.

/// Split a counter name into its metric and tag parts.
///
/// `df.bytes.free/mount=/data` becomes `("df.bytes.free", "mount=/data")`. A counter without tags
/// has an empty tag part.
pub fn split_counter(counter: &str) -> (&str, &str) {
    match counter.split_once('/') {
        Some((metric, tags)) => (metric, tags),
        None => (counter, ""),
    }
}

/// Parse a `key=value,key=value` tag string. Entries without a key are ignored.
pub fn parse_tags(tags: &str) -> Vec<(String, String)> {
    tags.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = key.trim();
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), value.trim().to_string()))
            }
        })
        .collect()
}
