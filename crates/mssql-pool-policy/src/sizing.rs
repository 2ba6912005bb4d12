//! Pool sizing resolution.
//!
//! The connection string may carry a `Maximum Pool Size` directive. The
//! resolver extracts it, adds a per-connection-string increment so that two
//! pools built from the identical string never end up with identical literal
//! capacities (downstream diagnostics key on capacity), and rewrites the
//! string with the effective value.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

/// Base capacity used when the directive is absent, malformed or
/// non-positive.
pub const DEFAULT_POOL_SIZE: u32 = 100;

#[allow(clippy::unwrap_used)] // pattern is a literal
static DIRECTIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)maximum\s+pool\s+size\s*=\s*([^;]*)").unwrap());

/// Effective sizing derived from one connection string.
///
/// Computed once when the string is assigned to a pool; immutable afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingDirective {
    /// Effective pool capacity: base directive plus registry increment.
    pub capacity: u32,
    /// Connection string rewritten to embed the effective capacity.
    pub connection_string: String,
}

/// Registry handing out per-connection-string capacity increments.
///
/// Keys are the raw connection strings, compared case-insensitively. The
/// counter starts at 1 for the first pool built from a string and grows by
/// one for each subsequent pool sharing it. Share a single registry (behind
/// an `Arc`) across pool constructions to get process-wide behavior; the
/// crate holds no global state.
#[derive(Debug, Default)]
pub struct SizingRegistry {
    counters: Mutex<HashMap<String, u32>>,
}

impl SizingRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the effective capacity for `raw` and rewrite the string.
    pub fn resolve(&self, raw: &str) -> SizingDirective {
        let base = extract_base_capacity(raw);
        let increment = self.next_increment(raw);
        // A directive near u32::MAX must not wrap to a tiny capacity.
        let capacity = base.saturating_add(increment);
        let connection_string = rewrite_directive(raw, capacity);

        tracing::debug!(
            base = base,
            increment = increment,
            capacity = capacity,
            "resolved pool sizing"
        );

        SizingDirective {
            capacity,
            connection_string,
        }
    }

    fn next_increment(&self, raw: &str) -> u32 {
        let mut counters = self.counters.lock();
        let counter = counters.entry(raw.to_ascii_lowercase()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Parse the directive value, falling back to [`DEFAULT_POOL_SIZE`] when it
/// is absent, malformed or non-positive.
fn extract_base_capacity(raw: &str) -> u32 {
    let Some(captures) = DIRECTIVE_RE.captures(raw) else {
        return DEFAULT_POOL_SIZE;
    };
    match captures[1].trim().parse::<i64>() {
        Ok(value) if value > 0 && value <= i64::from(u32::MAX) => value as u32,
        _ => DEFAULT_POOL_SIZE,
    }
}

/// Replace the directive with the effective capacity, or append it when the
/// string carries none. Unrecognized content passes through unchanged.
fn rewrite_directive(raw: &str, capacity: u32) -> String {
    let directive = format!("Maximum Pool Size={capacity}");
    if let Some(m) = DIRECTIVE_RE.find(raw) {
        format!("{}{}{}", &raw[..m.start()], directive, &raw[m.end()..])
    } else if raw.is_empty() {
        directive
    } else if raw.ends_with(';') {
        format!("{raw}{directive}")
    } else {
        format!("{raw};{directive}")
    }
}
