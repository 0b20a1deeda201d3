//! Intent classification for user utterances.
//!
//! Maps raw message text to exactly one [`Intent`] using an ordered cascade
//! of regex pattern groups. Evaluation is priority-based, not
//! confidence-scored: the first group with any matching pattern wins, and an
//! utterance matching several groups is resolved solely by group order.
//! The priority order is WebSearch > FactCheck > AirQuality > Directions >
//! Timezone, with PlainChat as the total fallback.
//!
//! Within the WebSearch group a secondary sub-classifier distinguishes
//! local-business queries ("pizza places near me") from generic news/fact
//! queries, because the two use different capability clients and result
//! shapes.
//!
//! False positives and negatives are an accepted limitation of the cascade;
//! they are resolved silently by group order and never surfaced to the user.

use regex::Regex;

/// The single classified purpose of one user utterance.
///
/// Exactly one intent is resolved per turn; classification is total, with
/// [`Intent::PlainChat`] as the default when no specialized group matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// General conversation, handled by the streaming chat capability
    PlainChat,
    /// Generic web search (news, facts, lookups)
    WebSearch,
    /// Location-scoped business search ("restaurants near me")
    LocalBusiness,
    /// Fact verification of a claim
    FactCheck,
    /// Air quality lookup for coordinates
    AirQuality,
    /// Navigation directions to a destination
    Directions,
    /// Time-zone lookup for a place
    Timezone,
}

impl Intent {
    /// Whether this intent needs device coordinates resolved before
    /// dispatch. Air quality always does; business and directions lookups
    /// only when the utterance carries no explicit place name.
    pub fn needs_geolocation(&self, has_explicit_place: bool) -> bool {
        match self {
            Intent::AirQuality => true,
            Intent::LocalBusiness | Intent::Directions => !has_explicit_place,
            _ => false,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlainChat => write!(f, "plain_chat"),
            Self::WebSearch => write!(f, "web_search"),
            Self::LocalBusiness => write!(f, "local_business"),
            Self::FactCheck => write!(f, "fact_check"),
            Self::AirQuality => write!(f, "air_quality"),
            Self::Directions => write!(f, "directions"),
            Self::Timezone => write!(f, "timezone"),
        }
    }
}

/// Web search trigger patterns. Includes the amenity vocabulary so that
/// local-business queries land in this group before the sub-classifier runs.
const WEB_SEARCH_PATTERNS: &[&str] = &[
    r"(?i)\bsearch(?:\s+the\s+web)?\s+for\b",
    r"(?i)\blook\s+up\b",
    r"(?i)\bgoogle\b",
    r"(?i)\b(?:latest|recent|today'?s)\s+news\b",
    r"(?i)\bnews\s+(?:about|on)\b",
    r"(?i)\bwhat(?:'s|\s+is)\s+happening\b",
    r"(?i)\bnear\s*me\b",
    r"(?i)\bnearby\b",
    r"(?i)\bclosest\b",
    r"(?i)\bopen\s+now\b",
    r"(?i)\b(?:restaurants?|cafes?|coffee\s+shops?|bars?|pizza\s+places?|hotels?|pharmac(?:y|ies)|gyms?|salons?|dentists?|plumbers?)\b",
    r"(?i)\bplaces\s+(?:to|for|near|around)\b",
];

/// Local-business sub-patterns, consulted only after the WebSearch group
/// matched.
const LOCAL_BUSINESS_PATTERNS: &[&str] = &[
    r"(?i)\bnear\s*me\b",
    r"(?i)\bnearby\b",
    r"(?i)\bclosest\b",
    r"(?i)\bopen\s+now\b",
    r"(?i)\b(?:restaurants?|cafes?|coffee\s+shops?|bars?|pizza\s+places?|hotels?|pharmac(?:y|ies)|gyms?|salons?|dentists?|plumbers?)\b",
    r"(?i)\bplaces\s+(?:to|for|near|around)\b",
];

const FACT_CHECK_PATTERNS: &[&str] = &[
    r"(?i)\bfact[\s-]?check\b",
    r"(?i)\bis\s+it\s+true\b",
    r"(?i)\btrue\s+or\s+false\b",
    r"(?i)\bverify\s+(?:that|this|whether)\b",
    r"(?i)\bdebunk\b",
];

const AIR_QUALITY_PATTERNS: &[&str] = &[
    r"(?i)\bair\s+quality\b",
    r"(?i)\baqi\b",
    r"(?i)\bpollen\b",
    r"(?i)\bsmog\b",
    r"(?i)\bair\s+pollution\b",
];

const DIRECTIONS_PATTERNS: &[&str] = &[
    r"(?i)\bdirections?\s+to\b",
    r"(?i)\bnavigate\s+to\b",
    r"(?i)\bhow\s+do\s+i\s+get\s+to\b",
    r"(?i)\btake\s+me\s+to\b",
    r"(?i)\broute\s+to\b",
    r"(?i)\bhow\s+far\s+is\b",
];

const TIMEZONE_PATTERNS: &[&str] = &[
    r"(?i)\bwhat\s+time\s+is\s+it\s+in\b",
    r"(?i)\btime\s*zone\b",
    r"(?i)\blocal\s+time\s+in\b",
    r"(?i)\bcurrent\s+time\s+in\b",
];

/// Explicit place detection: `in/at/around <Capitalized token(s)>`.
///
/// Used only to decide whether geolocation is needed; "near me" does not
/// match because `me` is lowercase.
const EXPLICIT_PLACE_PATTERN: &str =
    r"\b(?:in|at|around)\s+([A-Z][A-Za-z'\.]*(?:\s+[A-Z][A-Za-z'\.]*)*)";

/// One pattern group: an intent and the compiled disjunction of its triggers.
struct PatternGroup {
    intent: Intent,
    patterns: Vec<Regex>,
}

impl PatternGroup {
    fn compile(intent: Intent, sources: &[&str]) -> Self {
        let patterns = sources
            .iter()
            .map(|src| Regex::new(src).expect("intent pattern must compile"))
            .collect();
        Self { intent, patterns }
    }

    fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }
}

/// Priority-ordered intent classifier.
///
/// Compiles all pattern groups once; reuse a single instance per process.
///
/// # Examples
///
/// ```
/// use tern::intent::{Intent, IntentClassifier};
///
/// let classifier = IntentClassifier::new();
/// assert_eq!(classifier.classify("latest news about rust"), Intent::WebSearch);
/// assert_eq!(classifier.classify("pizza places near me"), Intent::LocalBusiness);
/// assert_eq!(classifier.classify("hello there"), Intent::PlainChat);
/// ```
pub struct IntentClassifier {
    groups: Vec<PatternGroup>,
    local_business: PatternGroup,
    explicit_place: Regex,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    /// Create a classifier with all pattern groups compiled in priority order.
    pub fn new() -> Self {
        let groups = vec![
            PatternGroup::compile(Intent::WebSearch, WEB_SEARCH_PATTERNS),
            PatternGroup::compile(Intent::FactCheck, FACT_CHECK_PATTERNS),
            PatternGroup::compile(Intent::AirQuality, AIR_QUALITY_PATTERNS),
            PatternGroup::compile(Intent::Directions, DIRECTIONS_PATTERNS),
            PatternGroup::compile(Intent::Timezone, TIMEZONE_PATTERNS),
        ];

        Self {
            groups,
            local_business: PatternGroup::compile(
                Intent::LocalBusiness,
                LOCAL_BUSINESS_PATTERNS,
            ),
            explicit_place: Regex::new(EXPLICIT_PLACE_PATTERN)
                .expect("explicit place pattern must compile"),
        }
    }

    /// Classify a raw utterance into exactly one intent.
    ///
    /// The first group with any matching pattern wins. A WebSearch match is
    /// refined to [`Intent::LocalBusiness`] when the local-business
    /// sub-patterns also match. Returns [`Intent::PlainChat`] when no group
    /// matches.
    pub fn classify(&self, text: &str) -> Intent {
        for group in &self.groups {
            if group.matches(text) {
                if group.intent == Intent::WebSearch && self.local_business.matches(text) {
                    return Intent::LocalBusiness;
                }
                return group.intent;
            }
        }
        Intent::PlainChat
    }

    /// Detect an explicit place name in the utterance.
    ///
    /// Returns the capitalized token sequence following `in`, `at`, or
    /// `around`, if any. When present, location-dependent intents skip
    /// geolocation and use the stated place instead.
    pub fn explicit_place(&self, text: &str) -> Option<String> {
        self.explicit_place
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches(['.', ',', '?', '!']).to_string())
            .filter(|place| !place.is_empty())
    }
}

/// Extract the claim to verify from a fact-check utterance.
///
/// Stripping rule: the claim is the text after the first leading marker
/// (`fact check`, `fact-check`, optionally followed by `:` or `that`), with
/// surrounding whitespace removed. When no marker prefix is present, the
/// claim is the verbatim utterance. Trailing punctuation is preserved: the
/// claim is forwarded exactly as the user stated it.
///
/// # Examples
///
/// ```
/// use tern::intent::extract_claim;
///
/// assert_eq!(extract_claim("fact check: the earth is flat"), "the earth is flat");
/// assert_eq!(extract_claim("is it true that cats sleep 16 hours?"), "cats sleep 16 hours?");
/// assert_eq!(extract_claim("the moon is made of cheese"), "the moon is made of cheese");
/// ```
pub fn extract_claim(text: &str) -> String {
    let markers = [
        r"(?i)^\s*fact[\s-]?check(?:\s+that)?\s*:?\s*",
        r"(?i)^\s*is\s+it\s+true\s+that\s+",
        r"(?i)^\s*is\s+it\s+true\s*:?\s*",
        r"(?i)^\s*verify\s+(?:that|this|whether)\s+",
        r"(?i)^\s*true\s+or\s+false\s*:?\s*",
    ];
    for marker in markers {
        let re = Regex::new(marker).expect("claim marker must compile");
        if let Some(m) = re.find(text) {
            let rest = text[m.end()..].trim();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    text.trim().to_string()
}

/// Extract the destination from a directions utterance, stripped of command
/// phrasing (`directions to`, `navigate to`, ...) and trailing punctuation.
pub fn extract_destination(text: &str) -> String {
    strip_command_prefix(
        text,
        &[
            r"(?i)^.*?\bdirections?\s+to\s+",
            r"(?i)^.*?\bnavigate\s+to\s+",
            r"(?i)^.*?\bhow\s+do\s+i\s+get\s+to\s+",
            r"(?i)^.*?\btake\s+me\s+to\s+",
            r"(?i)^.*?\broute\s+to\s+",
            r"(?i)^.*?\bhow\s+far\s+is\s+",
        ],
    )
}

/// Extract the place from a timezone utterance, stripped of command phrasing
/// (`what time is it in`, `local time in`, ...) and trailing punctuation.
pub fn extract_timezone_place(text: &str) -> String {
    strip_command_prefix(
        text,
        &[
            r"(?i)^.*?\bwhat\s+time\s+is\s+it\s+in\s+",
            r"(?i)^.*?\blocal\s+time\s+in\s+",
            r"(?i)^.*?\bcurrent\s+time\s+in\s+",
            r"(?i)^.*?\btime\s*zone\s+(?:of|in|for)\s+",
        ],
    )
}

/// Strip the first matching command prefix and trailing punctuation.
/// Falls back to the trimmed utterance when no prefix matches.
fn strip_command_prefix(text: &str, prefixes: &[&str]) -> String {
    for prefix in prefixes {
        let re = Regex::new(prefix).expect("command prefix must compile");
        if let Some(m) = re.find(text) {
            let rest = text[m.end()..]
                .trim()
                .trim_end_matches(['.', ',', '?', '!']);
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    text.trim().trim_end_matches(['.', ',', '?', '!']).to_string()
}
