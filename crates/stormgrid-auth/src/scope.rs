//! Wildcard scope containment.
//!
//! Scopes are `.`-separated names. A granted expression covers a requested
//! literal when it is the universal `*`, an exact match, or a trailing-`.*`
//! wildcard whose prefix lines up with the requested scope on a segment
//! boundary: `engine.match.*` covers `engine.match` and
//! `engine.match.read.all`, but never `engine.matchmaker`.
//!
//! Matching is case-sensitive and a pure function of its inputs.

/// Returns `true` if the granted expression covers the requested scope.
#[must_use]
pub fn contains(granted: &str, requested: &str) -> bool {
    if granted == "*" {
        return true;
    }
    if granted == requested {
        return true;
    }
    if let Some(prefix) = granted.strip_suffix(".*") {
        if requested == prefix {
            return true;
        }
        if let Some(rest) = requested.strip_prefix(prefix) {
            return rest.starts_with('.');
        }
    }
    false
}

/// Returns `true` if any granted expression covers the requested scope.
#[must_use]
pub fn covered(granted: &[String], requested: &str) -> bool {
    granted.iter().any(|g| contains(g, requested))
}

/// Returns `true` if at least one required scope is covered by the grant set.
#[must_use]
pub fn has_any(granted: &[String], required: &[String]) -> bool {
    required.iter().any(|r| covered(granted, r))
}

/// Returns `true` if every required scope is covered by the grant set.
#[must_use]
pub fn has_all(granted: &[String], required: &[String]) -> bool {
    required.iter().all(|r| covered(granted, r))
}

/// The required scopes not covered by the grant set.
#[must_use]
pub fn missing(granted: &[String], required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|r| !covered(granted, r))
        .cloned()
        .collect()
}

/// Splits a space-delimited scope parameter into individual scopes.
///
/// Empty input yields an empty list (RFC 6749 treats `scope` as optional).
#[must_use]
pub fn split(scope_param: &str) -> Vec<String> {
    scope_param
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
}

/// Joins scopes back into the space-delimited wire form.
#[must_use]
pub fn join(scopes: &[String]) -> String {
    scopes.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_universal_wildcard() {
        assert!(contains("*", "anything"));
        assert!(contains("*", "a.b.c"));
    }

    #[test]
    fn test_exact_match() {
        assert!(contains("engine.match.read", "engine.match.read"));
        assert!(!contains("engine.match.read", "engine.match.write"));
    }

    #[test]
    fn test_trailing_wildcard_matches_segment_boundary() {
        assert!(contains("a.b.*", "a.b"));
        assert!(contains("a.b.*", "a.b.c"));
        assert!(contains("a.b.*", "a.b.c.d"));
        assert!(!contains("a.b.*", "a.x"));
    }

    #[test]
    fn test_wildcard_never_matches_across_non_boundary() {
        assert!(!contains("a.bar.*", "a.barbaz.x"));
        assert!(!contains("a.bar.*", "a.barbaz"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!contains("Engine.Match.*", "engine.match.read"));
        assert!(!contains("a.b", "A.B"));
    }

    #[test]
    fn test_wildcard_only_trailing() {
        // A `*` that is not a trailing segment is a literal.
        assert!(!contains("a.*.c", "a.b.c"));
        assert!(contains("a.*.c", "a.*.c"));
    }

    #[test]
    fn test_has_any_short_circuits() {
        let granted = strings(&["engine.*"]);
        assert!(has_any(&granted, &strings(&["other.x", "engine.match"])));
        assert!(!has_any(&granted, &strings(&["other.x"])));
        assert!(!has_any(&granted, &[]));
    }

    #[test]
    fn test_has_all() {
        let granted = strings(&["engine.*", "control-plane.cluster.read"]);
        assert!(has_all(
            &granted,
            &strings(&["engine.match.read", "control-plane.cluster.read"])
        ));
        assert!(!has_all(
            &granted,
            &strings(&["engine.match.read", "control-plane.node.manage"])
        ));
        // Vacuously true.
        assert!(has_all(&granted, &[]));
    }

    #[test]
    fn test_missing() {
        let granted = strings(&["engine.*"]);
        let required = strings(&["engine.match.read", "auth.user.delete"]);
        assert_eq!(missing(&granted, &required), strings(&["auth.user.delete"]));
    }

    #[test]
    fn test_split_and_join() {
        assert_eq!(
            split("engine.match.read  control-plane.cluster.read"),
            strings(&["engine.match.read", "control-plane.cluster.read"])
        );
        assert!(split("").is_empty());
        assert!(split("   ").is_empty());
        assert_eq!(join(&strings(&["a", "b.c"])), "a b.c");
    }
}
