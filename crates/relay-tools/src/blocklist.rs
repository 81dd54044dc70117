// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Static name blocklist applied to tools advertised by untrusted sources
//! (MCP servers). Tools whose name matches an entry are silently dropped
//! before being merged into the registry; the caller is expected to log one
//! warning line per filtered tool.

/// Returns true if `name` appears in `blocklist` (case-sensitive exact
/// match — MCP tool names are expected to be used verbatim).
pub fn is_blocked(name: &str, blocklist: &[String]) -> bool {
    blocklist.iter().any(|b| b == name)
}

/// Filters `names`, returning the ones that survive the blocklist. Used by
/// the MCP client layer when merging a server's advertised tool list into
/// the local registry.
pub fn filter_blocked<'a>(names: impl IntoIterator<Item = &'a str>, blocklist: &[String]) -> Vec<&'a str> {
    names.into_iter().filter(|n| !is_blocked(n, blocklist)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_name_is_filtered() {
        let blocklist = vec!["Bash".to_string(), "Read".to_string(), "Write".to_string()];
        assert!(is_blocked("Bash", &blocklist));
        assert!(!is_blocked("Calculator", &blocklist));
    }

    #[test]
    fn filter_blocked_drops_only_listed_names() {
        let blocklist = vec!["Bash".to_string(), "Read".to_string(), "Write".to_string()];
        let advertised = vec!["Bash", "Read", "Write", "Calculator"];
        let survivors = filter_blocked(advertised, &blocklist);
        assert_eq!(survivors, vec!["Calculator"]);
    }

    #[test]
    fn empty_blocklist_lets_everything_through() {
        let survivors = filter_blocked(vec!["a", "b"], &[]);
        assert_eq!(survivors, vec!["a", "b"]);
    }
}
