use crate::error::{Error, Result};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    str::FromStr,
};

/// A parsed MIME type such as `text/csv; charset=UTF-8; header=absent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentType {
    pub main_type: String,
    pub sub_type: String,
    pub attributes: BTreeMap<String, String>,
}

impl ContentType {
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(';');
        let base = parts.next().unwrap_or_default().trim();
        let (main_type, sub_type) = base
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(value.to_string()))?;
        let (main_type, sub_type) = (main_type.trim(), sub_type.trim());
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(value.to_string()));
        }

        let attributes = parts
            .filter_map(|attribute| attribute.split_once('='))
            .map(|(key, value)| {
                (
                    key.trim().to_lowercase(),
                    value.trim().trim_matches('"').to_string(),
                )
            })
            .collect();

        Ok(Self {
            main_type: main_type.to_lowercase(),
            sub_type: sub_type.to_lowercase(),
            attributes,
        })
    }

    pub fn json() -> Self {
        Self::simple("application", "json")
    }

    pub fn text() -> Self {
        Self::simple("text", "plain")
    }

    pub fn csv() -> Self {
        Self::simple("text", "csv")
    }

    pub fn xml() -> Self {
        Self::simple("application", "xml")
    }

    pub fn octet_stream() -> Self {
        Self::simple("application", "octet-stream")
    }

    fn simple(main_type: &str, sub_type: &str) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.insert(key.into().to_lowercase(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn base_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    pub fn is_json(&self) -> bool {
        self.sub_type == "json"
            || self.sub_type.ends_with("+json")
            || self.sub_type == "x-json"
    }

    pub fn is_xml(&self) -> bool {
        self.sub_type == "xml" || self.sub_type.ends_with("+xml")
    }

    pub fn is_text(&self) -> bool {
        self.main_type == "text" || self.is_json() || self.is_xml()
    }

    /// Same base type, ignoring attributes.
    pub fn is_equivalent_to(&self, other: &ContentType) -> bool {
        self.main_type == other.main_type && self.sub_type == other.sub_type
    }

    /// Guess the content type of raw bytes.
    pub fn detect(bytes: &[u8]) -> Self {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.trim_start(),
            Err(_) => return Self::octet_stream(),
        };

        if (text.starts_with('{') || text.starts_with('['))
            && serde_json::from_str::<serde_json::Value>(text).is_ok()
        {
            Self::json()
        } else if text.starts_with('<') {
            Self::xml()
        } else {
            Self::text()
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        for (key, value) in &self.attributes {
            write!(f, ";{}={}", key, value)?;
        }
        Ok(())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attributes() {
        let content_type = ContentType::parse("text/csv; charset=UTF-8; header=absent").unwrap();
        assert_eq!(content_type.base_type(), "text/csv");
        assert_eq!(content_type.attribute("charset"), Some("UTF-8"));
        assert_eq!(content_type.attribute("header"), Some("absent"));
        assert_eq!(content_type.to_string(), "text/csv;charset=UTF-8;header=absent");
    }

    #[test]
    fn json_suffix_types_are_json() {
        assert!(ContentType::parse("application/vnd.api+json").unwrap().is_json());
        assert!(!ContentType::parse("application/protobuf").unwrap().is_json());
    }

    #[test]
    fn rejects_values_without_subtype() {
        assert!(ContentType::parse("json").is_err());
        assert!(ContentType::parse("text/").is_err());
    }

    #[test]
    fn detects_bodies() {
        assert_eq!(ContentType::detect(b"  {\"a\": 1}"), ContentType::json());
        assert_eq!(ContentType::detect(b"<xml/>"), ContentType::xml());
        assert_eq!(ContentType::detect(b"Name,100"), ContentType::text());
        assert_eq!(ContentType::detect(&[0xff, 0xfe, 0x00]), ContentType::octet_stream());
    }
}
