pub const DEFAULT_KEYWORDS: [&str; 3] = ["hotpot", "hot pot", "火锅"];

/// Case-insensitive substring matcher over a fixed keyword list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.as_ref().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn matches(&self, content: &str) -> bool {
        let content = content.to_lowercase();
        self.keywords.iter().any(|keyword| content.contains(keyword.as_str()))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}

#[cfg(test)]
mod tests {
    use super::KeywordMatcher;

    #[test]
    fn matches_default_keywords_case_insensitively() {
        let matcher = KeywordMatcher::default();

        assert!(matcher.matches("anyone up for HOTPOT tonight?"));
        assert!(matcher.matches("I want Hot Pot"));
        assert!(matcher.matches("今晚吃火锅吗"));
    }

    #[test]
    fn matching_is_substring_based() {
        let matcher = KeywordMatcher::default();

        assert!(matcher.matches("hotpotato"));
        assert!(!matcher.matches("just a pot of tea"));
        assert!(!matcher.matches(""));
    }

    #[test]
    fn custom_keywords_are_lowercased_and_empty_entries_dropped() {
        let matcher = KeywordMatcher::new(["Shabu", ""]);

        assert_eq!(matcher.keywords(), ["shabu".to_owned()]);
        assert!(matcher.matches("SHABU shabu friday"));
        assert!(!matcher.matches("hotpot"));
    }
}
