//! Vocabulary mapping between natural-language phrases and canonical codes.
//!
//! Three closed domains (technologies, actions, constraints). Each canonical
//! code owns a list of synonyms; the first synonym is the phrase used when
//! expanding the code back to text.

use std::collections::{BTreeSet, HashMap};

/// A canonical code and the phrases that map to it.
#[derive(Clone, Copy, Debug)]
pub struct VocabularyEntry {
    /// Canonical code
    pub code: &'static str,
    /// Lower-case synonyms; the first one is the representative phrase
    pub synonyms: &'static [&'static str],
}

const fn entry(code: &'static str, synonyms: &'static [&'static str]) -> VocabularyEntry {
    VocabularyEntry { code, synonyms }
}

/// Technology vocabulary.
pub const TECHNOLOGIES: &[VocabularyEntry] = &[
    entry("jwt", &["jwt", "json web token"]),
    entry("oauth", &["oauth", "oauth2", "openid connect"]),
    entry("bcrypt", &["bcrypt"]),
    entry("argon2", &["argon2"]),
    entry("postgresql", &["postgresql", "postgres"]),
    entry("mysql", &["mysql"]),
    entry("sql", &["sql"]),
    entry("nosql", &["nosql"]),
    entry("mongodb", &["mongodb", "mongo"]),
    entry("redis", &["redis"]),
    entry("rest", &["rest api", "restful", "rest endpoint"]),
    entry("graphql", &["graphql"]),
    entry("grpc", &["grpc"]),
    entry("websocket", &["websocket", "websockets"]),
    entry("docker", &["docker", "container"]),
    entry("kubernetes", &["kubernetes", "k8s"]),
    entry("kafka", &["kafka"]),
    entry("rabbitmq", &["rabbitmq"]),
    entry("elasticsearch", &["elasticsearch"]),
    entry("react", &["react"]),
    entry("nodejs", &["node.js", "nodejs"]),
    entry("python", &["python"]),
    entry("typescript", &["typescript"]),
    entry("aws", &["aws", "amazon web services"]),
    entry("stripe", &["stripe"]),
];

/// Action vocabulary.
pub const ACTIONS: &[VocabularyEntry] = &[
    entry("create", &["create", "build", "implement", "develop", "make", "set up", "write"]),
    entry("design", &["design", "architect"]),
    entry("optimize", &["optimize", "improve", "speed up", "enhance"]),
    entry("analyze", &["analyze", "analyse", "examine", "investigate", "review"]),
    entry("test", &["test", "validate", "verify"]),
    entry("deploy", &["deploy", "ship", "release"]),
    entry("refactor", &["refactor", "restructure", "clean up"]),
    entry("fix", &["fix", "debug", "repair", "resolve"]),
    entry("document", &["document", "explain", "describe"]),
    entry("migrate", &["migrate", "migration"]),
    entry("integrate", &["integrate", "connect"]),
    entry("monitor", &["monitor", "observe", "track"]),
];

/// Constraint vocabulary.
pub const CONSTRAINTS: &[VocabularyEntry] = &[
    entry("secure", &["secure", "security", "safe", "encrypted"]),
    entry("fast", &["fast", "low latency", "high performance", "performant", "quick"]),
    entry("scalable", &["scalable", "scale", "high throughput"]),
    entry("reliable", &["reliable", "high availability", "fault tolerant", "resilient"]),
    entry("real_time", &["real-time", "realtime", "real time"]),
    entry("rate_limited", &["rate limit", "rate-limit", "throttl"]),
    entry("simple", &["simple", "minimal", "lightweight"]),
    entry("tested", &["unit tests", "test coverage", "well tested"]),
    entry("documented", &["documented", "documentation"]),
    entry("compliant", &["compliant", "gdpr", "hipaa"]),
    entry("stateless", &["stateless"]),
];

/// Vocabulary domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    Technology,
    Action,
    Constraint,
}

impl Domain {
    /// The static table backing this domain.
    pub fn entries(self) -> &'static [VocabularyEntry] {
        match self {
            Domain::Technology => TECHNOLOGIES,
            Domain::Action => ACTIONS,
            Domain::Constraint => CONSTRAINTS,
        }
    }
}

/// Reverse index for one domain.
#[derive(Clone, Debug)]
struct DomainIndex {
    /// (synonym, code), longest synonym first
    patterns: Vec<(&'static str, &'static str)>,
    /// code -> representative phrase
    representatives: HashMap<&'static str, &'static str>,
}

impl DomainIndex {
    fn build(entries: &'static [VocabularyEntry]) -> Self {
        let mut patterns: Vec<(&'static str, &'static str)> = entries
            .iter()
            .flat_map(|e| e.synonyms.iter().map(move |s| (*s, e.code)))
            .collect();
        // Longest first so "nosql" claims its span before "sql" can.
        patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));

        let representatives = entries
            .iter()
            .filter_map(|e| e.synonyms.first().map(|s| (e.code, *s)))
            .collect();

        Self {
            patterns,
            representatives,
        }
    }

    fn extract(&self, text: &str) -> BTreeSet<&'static str> {
        let haystack = text.to_lowercase();
        let mut claimed = vec![false; haystack.len()];
        let mut found = BTreeSet::new();

        for (synonym, code) in &self.patterns {
            for (start, matched) in haystack.match_indices(synonym) {
                let span = start..start + matched.len();
                if claimed[span.clone()].iter().any(|c| *c) {
                    continue;
                }
                claimed[span].iter_mut().for_each(|c| *c = true);
                found.insert(*code);
            }
        }

        found
    }

    fn expand(&self, code: &str) -> String {
        match self.representatives.get(code) {
            Some(phrase) => phrase.to_string(),
            None => code.replace('_', " "),
        }
    }

    fn contains(&self, code: &str) -> bool {
        self.representatives.contains_key(code)
    }
}

/// Bidirectional phrase/code mapper across all vocabulary domains.
#[derive(Clone, Debug)]
pub struct VocabularyMapper {
    tech: DomainIndex,
    actions: DomainIndex,
    constraints: DomainIndex,
}

impl VocabularyMapper {
    /// Build the reverse indexes.
    pub fn new() -> Self {
        Self {
            tech: DomainIndex::build(TECHNOLOGIES),
            actions: DomainIndex::build(ACTIONS),
            constraints: DomainIndex::build(CONSTRAINTS),
        }
    }

    fn index(&self, domain: Domain) -> &DomainIndex {
        match domain {
            Domain::Technology => &self.tech,
            Domain::Action => &self.actions,
            Domain::Constraint => &self.constraints,
        }
    }

    /// Canonical codes whose synonyms occur in `text`.
    pub fn extract(&self, domain: Domain, text: &str) -> BTreeSet<&'static str> {
        self.index(domain).extract(text)
    }

    /// Technologies mentioned in `text`.
    pub fn extract_tech(&self, text: &str) -> BTreeSet<&'static str> {
        self.tech.extract(text)
    }

    /// Actions mentioned in `text`.
    pub fn extract_actions(&self, text: &str) -> BTreeSet<&'static str> {
        self.actions.extract(text)
    }

    /// Constraints mentioned in `text`.
    pub fn extract_constraints(&self, text: &str) -> BTreeSet<&'static str> {
        self.constraints.extract(text)
    }

    /// One representative phrase for a code. Unknown codes are de-slugged.
    pub fn expand(&self, domain: Domain, code: &str) -> String {
        self.index(domain).expand(code)
    }

    pub fn expand_tech(&self, code: &str) -> String {
        self.tech.expand(code)
    }

    pub fn expand_action(&self, code: &str) -> String {
        self.actions.expand(code)
    }

    pub fn expand_constraint(&self, code: &str) -> String {
        self.constraints.expand(code)
    }

    /// Whether `code` is a canonical code of `domain`.
    pub fn is_known(&self, domain: Domain, code: &str) -> bool {
        self.index(domain).contains(code)
    }
}

impl Default for VocabularyMapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nosql_does_not_match_sql() {
        let mapper = VocabularyMapper::new();
        let tech = mapper.extract_tech("a nosql database");
        assert_eq!(tech.into_iter().collect::<Vec<_>>(), vec!["nosql"]);
    }

    #[test]
    fn test_postgres_and_plain_sql_together() {
        let mapper = VocabularyMapper::new();
        let tech = mapper.extract_tech("Move from PostgreSQL to raw SQL queries");
        assert!(tech.contains("postgresql"));
        assert!(tech.contains("sql"));
    }

    #[test]
    fn test_case_folded_synonyms() {
        let mapper = VocabularyMapper::new();
        let tech = mapper.extract_tech("Use JSON Web Token auth over a RESTful gateway");
        assert!(tech.contains("jwt"));
        assert!(tech.contains("rest"));

        let actions = mapper.extract_actions("Build and then Deploy it");
        assert_eq!(actions.into_iter().collect::<Vec<_>>(), vec!["create", "deploy"]);
    }

    #[test]
    fn test_constraints() {
        let mapper = VocabularyMapper::new();
        let constraints =
            mapper.extract_constraints("Secure, real-time feed with rate limiting and high availability");
        for code in ["secure", "real_time", "rate_limited", "reliable"] {
            assert!(constraints.contains(code), "missing {}", code);
        }
    }

    #[test]
    fn test_every_code_expands() {
        let mapper = VocabularyMapper::new();
        for domain in [Domain::Technology, Domain::Action, Domain::Constraint] {
            for entry in domain.entries() {
                assert!(mapper.is_known(domain, entry.code));
                assert_eq!(mapper.expand(domain, entry.code), entry.synonyms[0]);
            }
        }
    }

    #[test]
    fn test_unknown_code_expands_to_words() {
        let mapper = VocabularyMapper::new();
        assert_eq!(mapper.expand_constraint("zero_downtime"), "zero downtime");
        assert!(!mapper.is_known(Domain::Constraint, "zero_downtime"));
    }
}
