/// Which protocol path a chat turn takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    FreshGeneration,
    Refinement,
}

pub trait IntentPolicy: Send + Sync {
    fn classify(&self, text: &str, current_sql: Option<&str>) -> Intent;
}

pub const REFINEMENT_KEYWORDS: &[&str] = &[
    "improve", "change", "modify", "fix", "add", "remove", "alter", "update", "better",
    "optimize", "join", "where",
];

/// Refinement when there is current SQL and the lower-cased text contains
/// any keyword as a substring ("address" contains "add").
#[derive(Debug, Clone)]
pub struct KeywordIntentPolicy {
    keywords: Vec<String>,
}

impl KeywordIntentPolicy {
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordIntentPolicy {
    fn default() -> Self {
        Self::with_keywords(REFINEMENT_KEYWORDS)
    }
}

impl IntentPolicy for KeywordIntentPolicy {
    fn classify(&self, text: &str, current_sql: Option<&str>) -> Intent {
        if current_sql.is_none_or(|sql| sql.trim().is_empty()) {
            return Intent::FreshGeneration;
        }
        let lowered = text.to_lowercase();
        if self.keywords.iter().any(|k| lowered.contains(k.as_str())) {
            Intent::Refinement
        } else {
            Intent::FreshGeneration
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQL: Option<&str> = Some("SELECT * FROM orders");

    #[test]
    fn test_every_keyword_triggers_refinement() {
        let policy = KeywordIntentPolicy::default();
        for keyword in REFINEMENT_KEYWORDS {
            let text = format!("please {} it", keyword.to_uppercase());
            assert_eq!(policy.classify(&text, SQL), Intent::Refinement, "{keyword}");
        }
    }

    #[test]
    fn test_plain_requests_are_fresh() {
        let policy = KeywordIntentPolicy::default();
        for text in ["show all customers", "how many orders last month", "list products"] {
            assert_eq!(policy.classify(text, SQL), Intent::FreshGeneration, "{text}");
        }
    }

    #[test]
    fn test_no_current_sql_is_always_fresh() {
        let policy = KeywordIntentPolicy::default();
        assert_eq!(policy.classify("optimize this", None), Intent::FreshGeneration);
        assert_eq!(policy.classify("optimize this", Some("  ")), Intent::FreshGeneration);
    }

    #[test]
    fn test_substring_match_is_preserved() {
        let policy = KeywordIntentPolicy::default();
        assert_eq!(
            policy.classify("show customer addresses", SQL),
            Intent::Refinement
        );
    }

    #[test]
    fn test_custom_keywords_replace_defaults() {
        let policy = KeywordIntentPolicy::with_keywords(["Tweak"]);
        assert_eq!(policy.classify("tweak it", SQL), Intent::Refinement);
        assert_eq!(policy.classify("optimize it", SQL), Intent::FreshGeneration);
    }
}
