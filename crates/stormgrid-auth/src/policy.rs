//! Declarative endpoint authorization policy.
//!
//! Routes register a required-scope policy keyed by `(method, path
//! template)`. The authorization middleware looks the table up per request;
//! no reflection or per-call registration. Templates use `{param}` segments
//! that match any single path segment. The first matching rule wins, so
//! more specific routes are registered before catch-alls.

use axum::http::Method;

use crate::scope;

/// Whether a policy requires any or all of its scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    /// At least one listed scope must be covered.
    Any,
    /// Every listed scope must be covered.
    All,
}

/// Scopes required to reach an endpoint.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    /// Required scopes (literals; wildcards live on the granted side).
    pub scopes: Vec<String>,
    /// Any-of or all-of.
    pub mode: PolicyMode,
}

impl ScopePolicy {
    /// Policy satisfied by any one of the given scopes.
    #[must_use]
    pub fn any_of(scopes: &[&str]) -> Self {
        Self {
            scopes: scopes.iter().map(ToString::to_string).collect(),
            mode: PolicyMode::Any,
        }
    }

    /// Policy requiring all of the given scopes.
    #[must_use]
    pub fn all_of(scopes: &[&str]) -> Self {
        Self {
            scopes: scopes.iter().map(ToString::to_string).collect(),
            mode: PolicyMode::All,
        }
    }

    /// Policy requiring exactly one scope.
    #[must_use]
    pub fn require(scope: &str) -> Self {
        Self::all_of(&[scope])
    }

    /// Returns `true` if the granted scopes satisfy this policy.
    #[must_use]
    pub fn is_satisfied_by(&self, granted: &[String]) -> bool {
        match self.mode {
            PolicyMode::Any => scope::has_any(granted, &self.scopes),
            PolicyMode::All => scope::has_all(granted, &self.scopes),
        }
    }

    /// The scopes to report in a 403. For `All` this is the uncovered
    /// subset; for `Any` it is the full alternative list.
    #[must_use]
    pub fn missing_for(&self, granted: &[String]) -> Vec<String> {
        match self.mode {
            PolicyMode::All => scope::missing(granted, &self.scopes),
            PolicyMode::Any => self.scopes.clone(),
        }
    }
}

/// Access rule attached to an endpoint.
#[derive(Debug, Clone)]
pub enum AccessRule {
    /// No credentials required.
    Anonymous,
    /// A verified bearer token satisfying the policy is required.
    Require(ScopePolicy),
}

#[derive(Debug, Clone)]
struct PathPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param,
}

impl PathPattern {
    fn parse(template: &str) -> Self {
        let segments = template
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('{') && s.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if parts.len() != self.segments.len() {
            return false;
        }
        self.segments.iter().zip(parts).all(|(seg, part)| match seg {
            Segment::Literal(lit) => lit == part,
            Segment::Param => true,
        })
    }
}

struct PolicyRule {
    method: Method,
    pattern: PathPattern,
    rule: AccessRule,
}

/// Ordered table of endpoint access rules.
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
    default_rule: AccessRule,
}

impl PolicyTable {
    /// Creates a table whose unmatched routes use `default_rule`.
    #[must_use]
    pub fn new(default_rule: AccessRule) -> Self {
        Self {
            rules: Vec::new(),
            default_rule,
        }
    }

    /// Registers a rule for `(method, template)`.
    #[must_use]
    pub fn route(mut self, method: Method, template: &str, rule: AccessRule) -> Self {
        self.rules.push(PolicyRule {
            method,
            pattern: PathPattern::parse(template),
            rule,
        });
        self
    }

    /// Shorthand for a scope-protected route.
    #[must_use]
    pub fn protect(self, method: Method, template: &str, policy: ScopePolicy) -> Self {
        self.route(method, template, AccessRule::Require(policy))
    }

    /// Looks up the rule for a concrete request. First match wins.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> &AccessRule {
        self.rules
            .iter()
            .find(|r| r.method == *method && r.pattern.matches(path))
            .map_or(&self.default_rule, |r| &r.rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_policy_any_vs_all() {
        let any = ScopePolicy::any_of(&["a.read", "a.admin"]);
        let all = ScopePolicy::all_of(&["a.read", "a.admin"]);
        let has_read = granted(&["a.read"]);

        assert!(any.is_satisfied_by(&has_read));
        assert!(!all.is_satisfied_by(&has_read));
        assert_eq!(all.missing_for(&has_read), vec!["a.admin"]);

        let superuser = granted(&["*"]);
        assert!(all.is_satisfied_by(&superuser));
    }

    #[test]
    fn test_policy_wildcard_grant() {
        let policy = ScopePolicy::require("control-plane.node.register");
        assert!(policy.is_satisfied_by(&granted(&["control-plane.node.*"])));
        assert!(policy.is_satisfied_by(&granted(&["control-plane.*"])));
        assert!(!policy.is_satisfied_by(&granted(&["control-plane.cluster.read"])));
    }

    #[test]
    fn test_path_pattern_matching() {
        let pattern = PathPattern::parse("/api/nodes/{id}/heartbeat");
        assert!(pattern.matches("/api/nodes/n1/heartbeat"));
        assert!(pattern.matches("/api/nodes/worker-04/heartbeat"));
        assert!(!pattern.matches("/api/nodes/n1"));
        assert!(!pattern.matches("/api/nodes/n1/drain"));
        assert!(!pattern.matches("/api/nodes/n1/heartbeat/extra"));
    }

    #[test]
    fn test_table_lookup_first_match_wins() {
        let table = PolicyTable::new(AccessRule::Anonymous)
            .protect(
                Method::GET,
                "/api/nodes",
                ScopePolicy::require("control-plane.cluster.read"),
            )
            .protect(
                Method::POST,
                "/api/nodes/{id}/drain",
                ScopePolicy::require("control-plane.node.manage"),
            );

        match table.lookup(&Method::GET, "/api/nodes") {
            AccessRule::Require(policy) => {
                assert_eq!(policy.scopes, vec!["control-plane.cluster.read"]);
            }
            AccessRule::Anonymous => panic!("expected a protected rule"),
        }

        // Different method on the same path falls through to the default.
        assert!(matches!(
            table.lookup(&Method::DELETE, "/api/nodes"),
            AccessRule::Anonymous
        ));
        assert!(matches!(
            table.lookup(&Method::GET, "/healthz"),
            AccessRule::Anonymous
        ));
    }

    #[test]
    fn test_more_specific_rule_shadows_template() {
        let table = PolicyTable::new(AccessRule::Anonymous)
            .protect(
                Method::POST,
                "/api/nodes/self/drain",
                ScopePolicy::require("control-plane.node.self"),
            )
            .protect(
                Method::POST,
                "/api/nodes/{id}/drain",
                ScopePolicy::require("control-plane.node.manage"),
            );

        match table.lookup(&Method::POST, "/api/nodes/self/drain") {
            AccessRule::Require(policy) => {
                assert_eq!(policy.scopes, vec!["control-plane.node.self"]);
            }
            AccessRule::Anonymous => panic!("expected a protected rule"),
        }
        match table.lookup(&Method::POST, "/api/nodes/n1/drain") {
            AccessRule::Require(policy) => {
                assert_eq!(policy.scopes, vec!["control-plane.node.manage"]);
            }
            AccessRule::Anonymous => panic!("expected a protected rule"),
        }
    }
}
