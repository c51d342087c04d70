use super::HeadersFilter;
use crate::model::MultiValueMap;
use regex::Regex;

#[derive(Debug)]
pub struct RemoveHeadersFilter {
    headers: Vec<String>,
}

impl RemoveHeadersFilter {
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(headers: I) -> Self {
        Self {
            headers: headers.into_iter().map(|e| e.into().to_lowercase()).collect(),
        }
    }
}

impl HeadersFilter for RemoveHeadersFilter {
    fn apply(&self, headers: &mut MultiValueMap) {
        headers.retain(|name, _| !self.headers.contains(&name.to_lowercase()));
    }
}

/// Removes every header whose name matches one of the patterns.
#[derive(Debug)]
pub struct RemoveHeadersRegexFilter {
    patterns: Vec<Regex>,
}

impl RemoveHeadersRegexFilter {
    pub fn new<I: IntoIterator<Item = Regex>>(patterns: I) -> Self {
        Self {
            patterns: patterns.into_iter().collect(),
        }
    }
}

impl HeadersFilter for RemoveHeadersRegexFilter {
    fn apply(&self, headers: &mut MultiValueMap) {
        headers.retain(|name, _| !self.patterns.iter().any(|pattern| pattern.is_match(name)));
    }
}
