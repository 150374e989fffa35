//! # Named-capture extraction for topic patterns.
//!
//! The bus and several integrations need the same operation: match a topic
//! string against a compiled pattern and hand back the named groups as a
//! string map. [`named_group_matches`] does exactly that.

use std::collections::HashMap;

use regex::Regex;

use crate::error::CoreError;

/// Returns a map of named capture groups to their matched substrings.
///
/// Every named group in `pattern` gets an entry; groups that did not
/// participate in the match map to an empty string. Patterns without named
/// groups yield an empty map. A non-matching `search` returns
/// [`CoreError::NoRegexMatch`].
pub fn named_group_matches(
    pattern: &Regex,
    search: &str,
) -> Result<HashMap<String, String>, CoreError> {
    let captures = pattern.captures(search).ok_or(CoreError::NoRegexMatch)?;

    let mut matches = HashMap::new();
    for name in pattern.capture_names().flatten() {
        let value = captures
            .name(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        matches.insert(name.to_string(), value);
    }

    Ok(matches)
}
