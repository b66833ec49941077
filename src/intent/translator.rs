//! Natural language to structured intent translation (V1).
//!
//! Turns a free-form instruction into a compact [`AgentIntent`] and back into
//! templated text. Extraction is heuristic and never fails: unknown phrasing
//! simply yields fewer fields.

use crate::core::config::TranslatorConfig;
use crate::core::{now, round_to, StructuredMessage, Timestamp};
use crate::intent::tokens::TokenCounter;
use crate::intent::vocabulary::VocabularyMapper;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::debug;

static TASK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:build|create|design|implement|develop)\s+(?:an?\s+|the\s+)?((?:[\w-]+\s+){0,4}?)(system|service|api|application|app|platform|pipeline|module|server|tool|library|cache|database|dashboard|engine|backend)\b",
    )
    .expect("TASK_PATTERN regex should compile")
});

static SUCCESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ensure|must|should)\s+(?:that\s+|be\s+)?([^.,;!?]+)")
        .expect("SUCCESS_PATTERN regex should compile")
});

/// Terminal nouns that carry no information of their own.
const GENERIC_TERMINALS: &[&str] = &["system", "service", "application", "app", "platform"];

/// Fallback task labels, checked in order.
const DOMAIN_NOUNS: &[(&str, &[&str])] = &[
    ("authentication", &["authentication", "auth", "login"]),
    ("payment", &["payment", "billing", "checkout"]),
    ("database", &["database", "schema"]),
    ("api", &["api", "endpoint"]),
    ("notification", &["notification", "alert"]),
    ("cache", &["cache", "caching"]),
    ("search", &["search"]),
    ("messaging", &["message queue", "messaging", "chat"]),
    ("analytics", &["analytics", "reporting", "metrics"]),
    ("storage", &["storage", "file upload"]),
    ("monitoring", &["monitoring", "logging"]),
    ("deployment", &["deployment", "ci/cd", "pipeline"]),
    ("user_management", &["user management", "user account"]),
];

const DATABASE_TECH: &[&str] = &["postgresql", "mysql", "mongodb", "redis", "nosql", "sql"];

/// Structured intent extracted from an instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentIntent {
    /// Short slug naming what is being worked on
    pub task: String,
    /// Canonical action codes
    pub actions: Vec<String>,
    /// Canonical technology codes
    pub tech: Vec<String>,
    /// Complexity score in [0, 1]
    pub complexity: f64,
    /// Canonical constraint codes
    pub constraints: Vec<String>,
    /// Nested component hints
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub components: Map<String, Value>,
    /// Success criteria slugs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success: Vec<String>,
}

impl AgentIntent {
    /// Convert to the generic message shape.
    pub fn to_message(&self) -> StructuredMessage {
        let mut msg = Map::new();
        msg.insert("task".into(), Value::from(self.task.clone()));
        msg.insert("actions".into(), Value::from(self.actions.clone()));
        msg.insert("tech".into(), Value::from(self.tech.clone()));
        msg.insert("complexity".into(), Value::from(self.complexity));
        msg.insert("constraints".into(), Value::from(self.constraints.clone()));
        if !self.components.is_empty() {
            msg.insert("components".into(), Value::Object(self.components.clone()));
        }
        if !self.success.is_empty() {
            msg.insert("success".into(), Value::from(self.success.clone()));
        }
        msg
    }

    /// Read an intent back out of a message, tolerating missing or mistyped fields.
    pub fn from_message(msg: &StructuredMessage) -> Self {
        Self {
            task: msg
                .get("task")
                .and_then(Value::as_str)
                .unwrap_or("system")
                .to_string(),
            actions: string_list(msg, "actions"),
            tech: string_list(msg, "tech"),
            complexity: msg.get("complexity").and_then(Value::as_f64).unwrap_or(0.0),
            constraints: string_list(msg, "constraints"),
            components: msg
                .get("components")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            success: string_list(msg, "success"),
        }
    }
}

fn string_list(msg: &StructuredMessage, key: &str) -> Vec<String> {
    msg.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Token accounting for one translation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyReport {
    /// Tokens in the original text
    pub original_tokens: usize,
    /// Tokens in the structured form
    pub compressed_tokens: usize,
    /// Token reduction percentage
    pub reduction_percent: f64,
    /// Characters in the original text
    pub original_chars: usize,
    /// Characters in the compact structured form
    pub compressed_chars: usize,
}

/// A recorded translation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranslationExample {
    /// Input text
    pub text: String,
    /// Structured output
    pub message: StructuredMessage,
    /// Token accounting
    pub report: EfficiencyReport,
    /// When the example was recorded
    pub recorded_at: Timestamp,
}

/// Aggregate statistics over recorded examples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslatorStatistics {
    pub examples: usize,
    pub total_original_tokens: usize,
    pub total_compressed_tokens: usize,
    pub average_reduction_percent: f64,
    pub best_reduction_percent: f64,
    pub worst_reduction_percent: f64,
}

/// Text to structured-intent translator.
#[derive(Clone, Debug)]
pub struct Translator {
    mapper: Arc<VocabularyMapper>,
    counter: TokenCounter,
    config: TranslatorConfig,
    examples: Vec<TranslationExample>,
}

impl Translator {
    /// Create a translator with default vocabulary and heuristic token counting.
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(VocabularyMapper::new()),
            TokenCounter::new(),
            TranslatorConfig::default(),
        )
    }

    /// Create a translator from explicit components.
    pub fn with_parts(
        mapper: Arc<VocabularyMapper>,
        counter: TokenCounter,
        config: TranslatorConfig,
    ) -> Self {
        Self {
            mapper,
            counter,
            config,
            examples: Vec::new(),
        }
    }

    /// The vocabulary in use.
    pub fn mapper(&self) -> &VocabularyMapper {
        &self.mapper
    }

    /// The token counter in use.
    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Extract a typed intent from text.
    pub fn translate(&self, text: &str) -> AgentIntent {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let lower = normalized.to_lowercase();

        let task = extract_task(&normalized, &lower);

        let tech: Vec<String> = self
            .mapper
            .extract_tech(&normalized)
            .into_iter()
            .map(String::from)
            .collect();
        let mut actions: Vec<String> = self
            .mapper
            .extract_actions(&normalized)
            .into_iter()
            .map(String::from)
            .collect();
        if actions.is_empty() {
            actions.push("create".to_string());
        }
        let constraints: Vec<String> = self
            .mapper
            .extract_constraints(&normalized)
            .into_iter()
            .map(String::from)
            .collect();

        let words = normalized.split_whitespace().count();
        let complexity = complexity_score(words, tech.len(), actions.len(), constraints.len());

        let components = build_components(&lower, &tech);
        let success = self.extract_success(&normalized, &lower, &tech, &actions, &constraints);

        debug!(task = %task, tech = tech.len(), actions = actions.len(), "translated instruction");

        AgentIntent {
            task,
            actions,
            tech,
            complexity,
            constraints,
            components,
            success,
        }
    }

    /// Translate text into a structured message.
    pub fn translate_to_agent(&self, text: &str) -> StructuredMessage {
        self.translate(text).to_message()
    }

    /// Render a structured message as an instruction.
    pub fn translate_to_human(&self, msg: &StructuredMessage) -> String {
        let intent = AgentIntent::from_message(msg);

        let actions: Vec<String> = intent
            .actions
            .iter()
            .map(|a| self.mapper.expand_action(a))
            .collect();
        let action_phrase = if actions.is_empty() {
            "Create".to_string()
        } else {
            capitalize(&join_conjunction(&actions))
        };

        let mut sentence = format!(
            "{} a {} (complexity {:.2})",
            action_phrase,
            intent.task.replace('_', " "),
            intent.complexity
        );

        if !intent.tech.is_empty() {
            let tech: Vec<String> = intent.tech.iter().map(|t| self.mapper.expand_tech(t)).collect();
            sentence.push_str(&format!(" using {}", join_conjunction(&tech)));
        }

        if !intent.constraints.is_empty() {
            let constraints: Vec<String> = intent
                .constraints
                .iter()
                .map(|c| self.mapper.expand_constraint(c))
                .collect();
            sentence.push_str(&format!(" that is {}", join_conjunction(&constraints)));
        }

        if !intent.components.is_empty() {
            let parts: Vec<String> = intent
                .components
                .iter()
                .map(|(name, value)| describe_component(name, value))
                .collect();
            sentence.push_str(&format!(", with components: {}", parts.join(", ")));
        }

        if !intent.success.is_empty() {
            let success: Vec<String> = intent.success.iter().map(|s| s.replace('_', " ")).collect();
            sentence.push_str(&format!(", ensuring {}", join_conjunction(&success)));
        }

        sentence.push('.');
        sentence
    }

    /// Token accounting for translating `text`.
    pub fn measure_efficiency(&self, text: &str) -> EfficiencyReport {
        let msg = self.translate_to_agent(text);
        let compact = serde_json::to_string(&msg).unwrap_or_default();
        let original_tokens = self.counter.count_text(text);
        let compressed_tokens = self.counter.count_text(&compact);

        EfficiencyReport {
            original_tokens,
            compressed_tokens,
            reduction_percent: round_to(
                TokenCounter::reduction(original_tokens, compressed_tokens),
                2,
            ),
            original_chars: text.chars().count(),
            compressed_chars: compact.chars().count(),
        }
    }

    /// Translate `text` and record the result for statistics.
    pub fn add_example(&mut self, text: &str) -> EfficiencyReport {
        let report = self.measure_efficiency(text);
        self.examples.push(TranslationExample {
            text: text.to_string(),
            message: self.translate_to_agent(text),
            report: report.clone(),
            recorded_at: now(),
        });
        report
    }

    /// Recorded examples.
    pub fn examples(&self) -> &[TranslationExample] {
        &self.examples
    }

    /// Aggregate statistics over recorded examples.
    pub fn get_statistics(&self) -> TranslatorStatistics {
        if self.examples.is_empty() {
            return TranslatorStatistics::default();
        }

        let reductions: Vec<f64> = self.examples.iter().map(|e| e.report.reduction_percent).collect();
        let total_original: usize = self.examples.iter().map(|e| e.report.original_tokens).sum();
        let total_compressed: usize = self.examples.iter().map(|e| e.report.compressed_tokens).sum();

        TranslatorStatistics {
            examples: self.examples.len(),
            total_original_tokens: total_original,
            total_compressed_tokens: total_compressed,
            average_reduction_percent: round_to(
                reductions.iter().sum::<f64>() / reductions.len() as f64,
                2,
            ),
            best_reduction_percent: reductions.iter().cloned().fold(f64::MIN, f64::max),
            worst_reduction_percent: reductions.iter().cloned().fold(f64::MAX, f64::min),
        }
    }

    fn extract_success(
        &self,
        normalized: &str,
        lower: &str,
        tech: &[String],
        actions: &[String],
        constraints: &[String],
    ) -> Vec<String> {
        let mut success: Vec<String> = Vec::new();
        let push = |item: String, success: &mut Vec<String>| {
            if !item.is_empty() && !success.contains(&item) {
                success.push(item);
            }
        };

        for caps in SUCCESS_PATTERN.captures_iter(normalized) {
            let clause = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            if clause.chars().count() < self.config.max_clause_len {
                push(slugify(clause), &mut success);
            }
        }

        let has = |list: &[String], code: &str| list.iter().any(|c| c == code);
        let auth_related = lower.contains("auth")
            || lower.contains("login")
            || has(tech, "jwt")
            || has(tech, "oauth");
        if auth_related {
            push("secure_access".into(), &mut success);
        }
        if has(constraints, "fast") {
            push("low_latency".into(), &mut success);
        }
        if has(constraints, "scalable") {
            push("horizontal_scaling".into(), &mut success);
        }
        if has(constraints, "reliable") {
            push("high_uptime".into(), &mut success);
        }
        if has(constraints, "rate_limited") {
            push("abuse_protection".into(), &mut success);
        }
        if has(actions, "test") || has(constraints, "tested") {
            push("tests_pass".into(), &mut success);
        }

        success.truncate(self.config.max_success);
        success
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_task(normalized: &str, lower: &str) -> String {
    if let Some(caps) = TASK_PATTERN.captures(normalized) {
        let phrase = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let terminal = caps
            .get(2)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();

        let mut slug = slugify(phrase);
        if !GENERIC_TERMINALS.contains(&terminal.as_str()) {
            if !slug.is_empty() {
                slug.push('_');
            }
            slug.push_str(&terminal);
        }
        if slug.is_empty() {
            slug = terminal;
        }
        if !slug.is_empty() {
            return slug;
        }
    }

    DOMAIN_NOUNS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(label, _)| label.to_string())
        .unwrap_or_else(|| "system".to_string())
}

fn complexity_score(words: usize, tech: usize, actions: usize, constraints: usize) -> f64 {
    let score = (words as f64 / 100.0).min(0.3)
        + (0.15 * tech as f64).min(0.3)
        + (0.1 * actions as f64).min(0.2)
        + (0.1 * constraints as f64).min(0.2);
    round_to(score.min(1.0), 2)
}

fn build_components(lower: &str, tech: &[String]) -> Map<String, Value> {
    let has_tech = |code: &str| tech.iter().any(|t| t == code);
    let mut components = Map::new();

    // auth
    let mut auth = Map::new();
    if let Some(method) = ["jwt", "oauth"].iter().find(|m| has_tech(m)) {
        auth.insert("method".into(), Value::from(*method));
    }
    if lower.contains("refresh token") {
        auth.insert("refresh".into(), Value::Bool(true));
    }
    if ["mfa", "2fa", "two-factor", "multi-factor"]
        .iter()
        .any(|k| lower.contains(k))
    {
        auth.insert("mfa".into(), Value::Bool(true));
    }
    if !auth.is_empty() {
        components.insert("auth".into(), Value::Object(auth));
    }

    // storage
    let mut storage = Map::new();
    if let Some(hasher) = ["bcrypt", "argon2"].iter().find(|h| has_tech(h)) {
        storage.insert("passwords".into(), Value::from(*hasher));
    } else if lower.contains("hash") {
        storage.insert("passwords".into(), Value::from("hashed"));
    }
    if let Some(db) = DATABASE_TECH.iter().find(|d| has_tech(d)) {
        storage.insert("db".into(), Value::from(*db));
    }
    if !storage.is_empty() {
        components.insert("storage".into(), Value::Object(storage));
    }

    // api
    let mut api = Map::new();
    if let Some(style) = ["rest", "graphql", "grpc"].iter().find(|s| has_tech(s)) {
        api.insert("style".into(), Value::from(*style));
    }
    if ["rate limit", "rate-limit", "throttl"]
        .iter()
        .any(|k| lower.contains(k))
    {
        api.insert("rate_limit".into(), Value::Bool(true));
    }
    if lower.contains("cors") {
        api.insert("cors".into(), Value::Bool(true));
    }
    if !api.is_empty() {
        components.insert("api".into(), Value::Object(api));
    }

    components
}

fn describe_component(name: &str, value: &Value) -> String {
    match value {
        Value::Object(fields) => {
            let details: Vec<String> = fields
                .iter()
                .map(|(key, v)| match v {
                    Value::Bool(true) => key.replace('_', " "),
                    Value::Bool(false) => format!("no {}", key.replace('_', " ")),
                    Value::String(s) => format!("{} {}", key.replace('_', " "), s),
                    other => format!("{} {}", key.replace('_', " "), other),
                })
                .collect();
            if details.is_empty() {
                name.to_string()
            } else {
                format!("{} ({})", name, details.join(", "))
            }
        }
        Value::String(s) => format!("{} {}", name, s),
        other => format!("{} {}", name, other),
    }
}

/// Lower-case snake_case slug.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// Join items as "a", "a and b", or "a, b, and c".
pub fn join_conjunction(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{} and {}", first, second),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCENARIO_A: &str = "Build a JWT authentication system with secure password hashing";

    #[test]
    fn test_scenario_jwt_authentication() {
        let translator = Translator::new();
        let msg = translator.translate_to_agent(SCENARIO_A);
        let intent = AgentIntent::from_message(&msg);

        assert_eq!(intent.task, "jwt_authentication");
        assert!(intent.tech.contains(&"jwt".to_string()));
        assert!(intent.constraints.contains(&"secure".to_string()));
        assert!(intent.actions.contains(&"create".to_string()));
        assert_eq!(intent.complexity, 0.44);
        assert_eq!(intent.components["auth"], json!({"method": "jwt"}));
        assert_eq!(intent.components["storage"], json!({"passwords": "hashed"}));
        assert!(intent.success.contains(&"secure_access".to_string()));

        let counter = translator.counter();
        assert!(counter.count_structured(&msg) < counter.count_text(SCENARIO_A));
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let translator = Translator::new();
        let spaced = "  Build   a JWT\n authentication\tsystem with secure password hashing ";
        assert_eq!(
            translator.translate_to_agent(spaced),
            translator.translate_to_agent(SCENARIO_A)
        );
    }

    #[test]
    fn test_specific_terminal_kept_in_task() {
        let translator = Translator::new();
        let intent = translator.translate("Create a REST API service with rate limiting and CORS support");
        assert_eq!(intent.task, "rest_api");
        assert_eq!(intent.tech, vec!["rest"]);
        assert_eq!(intent.constraints, vec!["rate_limited"]);
        assert_eq!(
            intent.components["api"],
            json!({"style": "rest", "rate_limit": true, "cors": true})
        );
    }

    #[test]
    fn test_task_falls_back_to_domain_noun_then_default() {
        let translator = Translator::new();
        assert_eq!(
            translator.translate("Please look into why checkout payments fail").task,
            "payment"
        );
        assert_eq!(translator.translate("Do the thing quickly").task, "system");
    }

    #[test]
    fn test_default_action_and_empty_optional_fields() {
        let translator = Translator::new();
        let msg = translator.translate_to_agent("Something about the weather today");
        assert_eq!(msg["actions"], json!(["create"]));
        assert!(msg.get("components").is_none());
        assert!(msg.get("success").is_none());
    }

    #[test]
    fn test_complexity_is_capped() {
        assert_eq!(complexity_score(500, 10, 10, 10), 1.0);
        assert_eq!(complexity_score(0, 0, 1, 0), 0.1);
    }

    #[test]
    fn test_success_clauses_and_limit() {
        let translator = Translator::new();
        let intent = translator.translate(
            "Build a login service. Ensure sessions expire after one hour, it must be scalable, \
             the api should respond fast and it must stay reliable, ensure tests cover every endpoint",
        );
        assert!(intent.success.len() <= 5);
        assert_eq!(intent.success[0], "sessions_expire_after_one_hour");
        assert!(intent.success.contains(&"scalable".to_string()));
    }

    #[test]
    fn test_long_clause_is_skipped() {
        let translator = Translator::new();
        let intent = translator.translate(
            "Ensure that every single request coming from any external partner is audited and archived",
        );
        assert!(intent.success.is_empty());
    }

    #[test]
    fn test_translate_to_human() {
        let translator = Translator::new();
        let msg = translator.translate_to_agent(SCENARIO_A);
        let text = translator.translate_to_human(&msg);
        assert_eq!(
            text,
            "Create a jwt authentication (complexity 0.44) using jwt that is secure, \
             with components: auth (method jwt), storage (passwords hashed), ensuring secure access."
        );
    }

    #[test]
    fn test_human_text_mentions_every_field() {
        let translator = Translator::new();
        let msg = translator.translate_to_agent(
            "Design and test a scalable GraphQL gateway using Redis and Kafka with refresh tokens",
        );
        let text = translator.translate_to_human(&msg);
        for phrase in ["Design and test", "graphql, kafka, and redis", "scalable", "refresh"] {
            assert!(text.contains(phrase), "{:?} missing from {:?}", phrase, text);
        }
    }

    #[test]
    fn test_join_conjunction() {
        let items = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(join_conjunction(&items(&[])), "");
        assert_eq!(join_conjunction(&items(&["a"])), "a");
        assert_eq!(join_conjunction(&items(&["a", "b"])), "a and b");
        assert_eq!(join_conjunction(&items(&["a", "b", "c"])), "a, b, and c");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("JWT authentication "), "jwt_authentication");
        assert_eq!(slugify("  real-time  feed!"), "real_time_feed");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_statistics_accumulate() {
        let mut translator = Translator::new();
        assert_eq!(translator.get_statistics(), TranslatorStatistics::default());

        translator.add_example(SCENARIO_A);
        translator.add_example(
            "Implement a real-time notification service using WebSockets and Redis with high availability",
        );

        let stats = translator.get_statistics();
        assert_eq!(stats.examples, 2);
        assert_eq!(translator.examples().len(), 2);
        assert!(stats.total_compressed_tokens < stats.total_original_tokens);
        assert!(stats.best_reduction_percent >= stats.worst_reduction_percent);
        assert!(stats.average_reduction_percent > 0.0);
    }
}
