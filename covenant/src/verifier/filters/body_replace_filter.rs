use super::BodyFilter;
use regex::Regex;

#[derive(Debug)]
pub struct BodyReplaceFilter {
    text: String,
    substitution: String,
}

impl BodyReplaceFilter {
    pub fn new<S1: Into<String>, S2: Into<String>>(text: S1, substitution: S2) -> Self {
        BodyReplaceFilter {
            text: text.into(),
            substitution: substitution.into(),
        }
    }
}

impl BodyFilter for BodyReplaceFilter {
    fn apply(&self, body: &mut String) {
        *body = body.replace(&self.text, &self.substitution);
    }
}

#[derive(Debug)]
pub struct BodyReplaceRegexFilter {
    pattern: Regex,
    substitution: String,
}

impl BodyReplaceRegexFilter {
    pub fn new<S: Into<String>>(pattern: Regex, substitution: S) -> Self {
        BodyReplaceRegexFilter {
            pattern,
            substitution: substitution.into(),
        }
    }
}

impl BodyFilter for BodyReplaceRegexFilter {
    fn apply(&self, body: &mut String) {
        *body = self.pattern.replace_all(body, self.substitution.as_str()).into();
    }
}
