//! Route indexing and caching policy.
//!
//! A static table of per-path rules, declared once at process start and
//! consulted read-only on every request. Exact rules beat wildcard rules;
//! the global "site not discoverable" flag is a kill switch that forces
//! every path non-indexable regardless of what any rule says; a declared
//! restricted-area prefix is non-indexable by default even on discoverable
//! sites, unless a rule explicitly opts it back in.
//!
//! Wildcard semantics: patterns are `/`-segmented. A segment is a literal, a
//! bare `*` matching exactly one whole segment, or a literal with one
//! embedded `*` matching greedily within that segment (`/ca*` matches
//! `/cart`). Segment counts must agree; more than one `*` per segment is
//! rejected when the table is built.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use thiserror::Error;

/// Directives rendered into `X-Robots-Tag` and robots meta tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsDirective {
    NoIndex,
    NoFollow,
    NoArchive,
    NoImageIndex,
}

impl RobotsDirective {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotsDirective::NoIndex => "noindex",
            RobotsDirective::NoFollow => "nofollow",
            RobotsDirective::NoArchive => "noarchive",
            RobotsDirective::NoImageIndex => "noimageindex",
        }
    }
}

impl std::fmt::Display for RobotsDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sitemap change-frequency hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeFrequency::Always => "always",
            ChangeFrequency::Hourly => "hourly",
            ChangeFrequency::Daily => "daily",
            ChangeFrequency::Weekly => "weekly",
            ChangeFrequency::Monthly => "monthly",
            ChangeFrequency::Yearly => "yearly",
            ChangeFrequency::Never => "never",
        }
    }
}

/// One declared rule: a path pattern plus policy overrides.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pattern: String,
    no_index: Option<bool>,
    robots: Option<Vec<RobotsDirective>>,
    priority: Option<f32>,
    change_frequency: Option<ChangeFrequency>,
}

impl RouteRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            no_index: None,
            robots: None,
            priority: None,
            change_frequency: None,
        }
    }

    pub fn no_index(mut self, no_index: bool) -> Self {
        self.no_index = Some(no_index);
        self
    }

    pub fn robots(mut self, directives: Vec<RobotsDirective>) -> Self {
        self.robots = Some(directives);
        self
    }

    pub fn priority(mut self, priority: f32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn change_frequency(mut self, frequency: ChangeFrequency) -> Self {
        self.change_frequency = Some(frequency);
        self
    }
}

/// The classification result for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub no_index: bool,
    pub robots: Vec<RobotsDirective>,
    pub priority: f32,
    pub change_frequency: ChangeFrequency,
}

impl RouteDecision {
    /// Whether responses for this path may enter shared caches.
    pub fn cacheable(&self) -> bool {
        !self.no_index
    }
}

const DEFAULT_PRIORITY: f32 = 0.5;
const DEFAULT_CHANGE_FREQUENCY: ChangeFrequency = ChangeFrequency::Weekly;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("route pattern must not be empty")]
    Empty,
    #[error("route pattern `{pattern}` has more than one `*` in a segment")]
    MultipleGlobs { pattern: String },
}

#[derive(Debug, Clone)]
enum SegmentMatcher {
    Literal(String),
    Any,
    Glob { prefix: String, suffix: String },
}

impl SegmentMatcher {
    fn matches(&self, segment: &str) -> bool {
        match self {
            SegmentMatcher::Literal(literal) => literal == segment,
            SegmentMatcher::Any => true,
            SegmentMatcher::Glob { prefix, suffix } => {
                segment.len() >= prefix.len() + suffix.len()
                    && segment.starts_with(prefix.as_str())
                    && segment.ends_with(suffix.as_str())
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    segments: Vec<SegmentMatcher>,
}

impl CompiledPattern {
    fn matches(&self, path: &str) -> bool {
        let segments = path_segments(path);
        self.segments.len() == segments.len()
            && self
                .segments
                .iter()
                .zip(segments)
                .all(|(matcher, segment)| matcher.matches(segment))
    }
}

fn path_segments(path: &str) -> Vec<&str> {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

fn compile_pattern(pattern: &str) -> Result<Option<CompiledPattern>, PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }
    if !pattern.contains('*') {
        return Ok(None);
    }

    let mut segments = Vec::new();
    for raw in path_segments(pattern) {
        let matcher = match raw.matches('*').count() {
            0 => SegmentMatcher::Literal(raw.to_string()),
            1 if raw == "*" => SegmentMatcher::Any,
            1 => {
                let (prefix, suffix) = raw.split_once('*').unwrap_or((raw, ""));
                SegmentMatcher::Glob {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                }
            }
            _ => {
                return Err(PatternError::MultipleGlobs {
                    pattern: pattern.to_string(),
                });
            }
        };
        segments.push(matcher);
    }

    Ok(Some(CompiledPattern { segments }))
}

/// Builder for the process-wide rule table.
#[derive(Debug, Clone, Default)]
pub struct RouteRulesBuilder {
    rules: Vec<RouteRule>,
    restricted_prefix: Option<String>,
}

impl RouteRulesBuilder {
    pub fn rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Declare the restricted-area prefix: non-indexable by default even on
    /// discoverable sites, reflecting privacy-by-default for
    /// authenticated-only content.
    pub fn restricted_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.restricted_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> Result<RouteRules, PatternError> {
        let mut exact = HashMap::new();
        let mut wildcards = Vec::new();

        for (index, rule) in self.rules.iter().enumerate() {
            match compile_pattern(&rule.pattern)? {
                Some(compiled) => wildcards.push((compiled, index)),
                None => {
                    // First declaration wins for duplicate exact paths.
                    exact.entry(normalize(&rule.pattern)).or_insert(index);
                }
            }
        }

        Ok(RouteRules {
            rules: self.rules,
            exact,
            wildcards,
            restricted_prefix: self.restricted_prefix,
        })
    }
}

fn normalize(path: &str) -> String {
    if path == "/" {
        return path.to_string();
    }
    path.trim_end_matches('/').to_string()
}

/// The static rule table; matching is read-only at request time.
#[derive(Debug, Clone)]
pub struct RouteRules {
    rules: Vec<RouteRule>,
    exact: HashMap<String, usize>,
    wildcards: Vec<(CompiledPattern, usize)>,
    restricted_prefix: Option<String>,
}

impl RouteRules {
    pub fn builder() -> RouteRulesBuilder {
        RouteRulesBuilder::default()
    }

    fn matched_rule(&self, path: &str) -> Option<&RouteRule> {
        if let Some(&index) = self.exact.get(&normalize(path)) {
            return self.rules.get(index);
        }
        self.wildcards
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .and_then(|(_, index)| self.rules.get(*index))
    }

    /// Classify a request path against the table and the global flag.
    pub fn classify(&self, path: &str, global_discoverable: bool) -> RouteDecision {
        let rule = self.matched_rule(path);

        let explicit_no_index = rule.and_then(|r| r.no_index);
        let mut no_index = explicit_no_index.unwrap_or(false);
        let mut robots = rule
            .and_then(|r| r.robots.clone())
            .unwrap_or_else(|| {
                if no_index {
                    vec![RobotsDirective::NoIndex]
                } else {
                    Vec::new()
                }
            });
        let priority = rule.and_then(|r| r.priority).unwrap_or(DEFAULT_PRIORITY);
        let change_frequency = rule
            .and_then(|r| r.change_frequency)
            .unwrap_or(DEFAULT_CHANGE_FREQUENCY);

        // Restricted area: private by default unless a rule explicitly says
        // this path is indexable.
        if let Some(prefix) = self.restricted_prefix.as_deref() {
            if path.starts_with(prefix) && explicit_no_index != Some(false) {
                no_index = true;
                robots = vec![RobotsDirective::NoIndex, RobotsDirective::NoFollow];
            }
        }

        // Kill switch: cannot be weakened by any rule.
        if !global_discoverable {
            no_index = true;
            robots = vec![RobotsDirective::NoIndex, RobotsDirective::NoFollow];
        }

        RouteDecision {
            no_index,
            robots,
            priority,
            change_frequency,
        }
    }

    pub(crate) fn restricted_prefix(&self) -> Option<&str> {
        self.restricted_prefix.as_deref()
    }

    /// Exact-rule paths that are declared non-indexable, for robots.txt.
    pub(crate) fn disallowed_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .exact
            .iter()
            .filter(|&(_, &index)| {
                self.rules
                    .get(index)
                    .is_some_and(|rule| rule.no_index == Some(true))
            })
            .map(|(path, _)| path.as_str())
            .collect();
        paths.sort_unstable();
        paths
    }
}

/// Storefront default rule table.
pub static DEFAULT_RULES: Lazy<RouteRules> = Lazy::new(|| {
    RouteRules::builder()
        .rule(
            RouteRule::new("/")
                .priority(1.0)
                .change_frequency(ChangeFrequency::Daily),
        )
        .rule(RouteRule::new("/products/*").priority(0.8))
        .rule(RouteRule::new("/collections/*").priority(0.7))
        .rule(RouteRule::new("/cart").no_index(true))
        .rule(RouteRule::new("/checkout*").no_index(true))
        .rule(RouteRule::new("/search").no_index(true))
        .restricted_prefix("/account")
        .build()
        .expect("default route rules are valid")
});

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteRules {
        RouteRules::builder()
            .rule(RouteRule::new("/cart").no_index(true))
            .rule(RouteRule::new("/ca*"))
            .rule(RouteRule::new("/products/*").priority(0.8))
            .rule(
                RouteRule::new("/account/help")
                    .no_index(false)
                    .priority(0.3),
            )
            .restricted_prefix("/account")
            .build()
            .expect("table builds")
    }

    #[test]
    fn unmatched_path_gets_permissive_default() {
        let decision = table().classify("/about", true);
        assert!(!decision.no_index);
        assert!(decision.robots.is_empty());
        assert_eq!(decision.priority, DEFAULT_PRIORITY);
        assert_eq!(decision.change_frequency, ChangeFrequency::Weekly);
    }

    #[test]
    fn exact_rule_beats_wildcard_for_same_path() {
        // `/cart` (noindex, exact) vs `/ca*` (indexable, wildcard).
        let decision = table().classify("/cart", true);
        assert!(decision.no_index);
        assert_eq!(decision.robots, vec![RobotsDirective::NoIndex]);

        // A sibling only the wildcard matches stays indexable.
        assert!(!table().classify("/catalog", true).no_index);
    }

    #[test]
    fn wildcards_match_in_declaration_order() {
        let rules = RouteRules::builder()
            .rule(RouteRule::new("/p/*").priority(0.9))
            .rule(RouteRule::new("/*").priority(0.1))
            .build()
            .expect("table builds");

        assert_eq!(rules.classify("/p/hat", true).priority, 0.9);
        assert_eq!(rules.classify("/q", true).priority, 0.1);
    }

    #[test]
    fn bare_star_matches_exactly_one_segment() {
        let decision = table().classify("/products/hat", true);
        assert_eq!(decision.priority, 0.8);

        // Two segments under /products do not match a single `*`.
        assert_eq!(
            table().classify("/products/hat/reviews", true).priority,
            DEFAULT_PRIORITY
        );
    }

    #[test]
    fn kill_switch_overrides_every_rule() {
        let rules = table();
        for path in ["/", "/cart", "/catalog", "/products/hat", "/account/help"] {
            let decision = rules.classify(path, false);
            assert!(decision.no_index, "{path} must be noindex");
            assert_eq!(
                decision.robots,
                vec![RobotsDirective::NoIndex, RobotsDirective::NoFollow]
            );
        }
    }

    #[test]
    fn restricted_prefix_defaults_to_private() {
        let decision = table().classify("/account/orders", true);
        assert!(decision.no_index);
        assert_eq!(
            decision.robots,
            vec![RobotsDirective::NoIndex, RobotsDirective::NoFollow]
        );
    }

    #[test]
    fn explicit_rule_can_open_restricted_path() {
        let decision = table().classify("/account/help", true);
        assert!(!decision.no_index);
        assert_eq!(decision.priority, 0.3);
    }

    #[test]
    fn multiple_globs_per_segment_are_rejected() {
        let err = RouteRules::builder()
            .rule(RouteRule::new("/a*b*"))
            .build()
            .expect_err("pattern must be rejected");
        assert!(matches!(err, PatternError::MultipleGlobs { .. }));
    }

    #[test]
    fn in_segment_glob_matches_greedily() {
        let rules = RouteRules::builder()
            .rule(RouteRule::new("/ca*t").no_index(true))
            .build()
            .expect("table builds");

        assert!(rules.classify("/cat", true).no_index);
        assert!(rules.classify("/carrot", true).no_index);
        assert!(!rules.classify("/car", true).no_index);
    }

    #[test]
    fn trailing_slash_is_normalized_for_exact_rules() {
        assert!(table().classify("/cart/", true).no_index);
    }

    #[test]
    fn default_table_classifies_storefront_paths() {
        assert!(!DEFAULT_RULES.classify("/", true).no_index);
        assert_eq!(DEFAULT_RULES.classify("/", true).priority, 1.0);
        assert!(DEFAULT_RULES.classify("/cart", true).no_index);
        assert!(DEFAULT_RULES.classify("/checkout", true).no_index);
        assert!(DEFAULT_RULES.classify("/account/orders", true).no_index);
        assert_eq!(DEFAULT_RULES.classify("/products/hat", true).priority, 0.8);
    }
}
