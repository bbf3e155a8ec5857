//! Table-driven "pick first non-empty" field precedence, shared by every
//! consolidator so a new precedence order is a data change, not new
//! branching logic.

/// Returns the first `Some(non-empty)` value among `sources`, in order.
/// Each tuple is `(source_tag, value)` — the tag exists for
/// traceability/tests, not used in the selection itself.
pub fn pick_first_non_empty(sources: &[(&str, Option<&str>)]) -> Option<String> {
    for (_, value) in sources {
        if let Some(v) = value {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Joins non-null path segments with `/`, skipping blanks — used for
/// hierarchical department paths.
pub fn join_non_null(segments: &[Option<&str>], separator: &str) -> String {
    segments
        .iter()
        .filter_map(|s| s.map(str::trim).filter(|s| !s.is_empty()))
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_first_non_empty_skips_blank_and_none() {
        let sources = [("tdx", Some("  ")), ("umapi", Some("Chemistry")), ("ad", Some("X"))];
        assert_eq!(pick_first_non_empty(&sources), Some("Chemistry".to_string()));
    }

    #[test]
    fn pick_first_non_empty_returns_none_when_all_blank() {
        let sources = [("tdx", None), ("umapi", Some(""))];
        assert_eq!(pick_first_non_empty(&sources), None);
    }

    #[test]
    fn join_non_null_skips_blank_segments() {
        let segments = [Some("LSA"), None, Some(""), Some("Chemistry")];
        assert_eq!(join_non_null(&segments, "/"), "LSA/Chemistry");
    }
}
