//! Date and time patterns written with the `yyyy-MM-dd'T'HH:mm:ss` letters
//! used in pact files, converted to `chrono` strftime items.

use crate::error::{Error, Result};
use chrono::format::{parse, Parsed, StrftimeItems};

pub const DEFAULT_DATE: &str = "yyyy-MM-dd";
pub const DEFAULT_TIME: &str = "HH:mm:ss";
pub const DEFAULT_DATETIME: &str = "yyyy-MM-dd'T'HH:mm:ss";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Format,
    Parse,
}

/// Convert a pattern to a strftime string for formatting values.
pub fn to_strftime(pattern: &str) -> Result<String> {
    convert(pattern, Purpose::Format)
}

fn convert(pattern: &str, purpose: Purpose) -> Result<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut output = String::new();
    let mut position = 0;

    while position < chars.len() {
        let current = chars[position];

        if current == '\'' {
            // quoted literal, '' is an escaped quote
            if chars.get(position + 1) == Some(&'\'') {
                output.push('\'');
                position += 2;
                continue;
            }
            let mut end = position + 1;
            while end < chars.len() && chars[end] != '\'' {
                push_literal(&mut output, chars[end]);
                end += 1;
            }
            if end == chars.len() {
                return Err(invalid(pattern, "unterminated quoted literal"));
            }
            position = end + 1;
            continue;
        }

        if !current.is_ascii_alphabetic() {
            push_literal(&mut output, current);
            position += 1;
            continue;
        }

        let mut count = 1;
        while chars.get(position + count) == Some(&current) {
            count += 1;
        }
        position += count;

        let item = match (current, count) {
            ('y', 2) | ('u', 2) => "%y".to_string(),
            ('y', _) | ('u', _) => "%Y".to_string(),
            ('M', 1) | ('L', 1) => "%-m".to_string(),
            ('M', 2) | ('L', 2) => "%m".to_string(),
            ('M', 3) | ('L', 3) => "%b".to_string(),
            ('M', _) | ('L', _) => "%B".to_string(),
            ('d', 1) => "%-d".to_string(),
            ('d', _) => "%d".to_string(),
            ('D', _) => "%j".to_string(),
            ('H', 1) => "%-H".to_string(),
            ('H', _) => "%H".to_string(),
            ('k', _) => "%H".to_string(),
            ('h', 1) => "%-I".to_string(),
            ('h', _) => "%I".to_string(),
            ('K', _) => "%I".to_string(),
            ('m', 1) => "%-M".to_string(),
            ('m', _) => "%M".to_string(),
            ('s', 1) => "%-S".to_string(),
            ('s', _) => "%S".to_string(),
            ('S', digits) => match digits {
                1..=3 => "%3f".to_string(),
                4..=6 => "%6f".to_string(),
                _ => "%9f".to_string(),
            },
            ('a', _) => "%p".to_string(),
            ('E', 1..=3) => "%a".to_string(),
            ('E', _) => "%A".to_string(),
            ('X', 3) | ('x', 3) if purpose == Purpose::Parse => "%#z".to_string(),
            ('X', 3) | ('x', 3) => "%:z".to_string(),
            ('X', _) | ('x', _) | ('Z', _) if purpose == Purpose::Parse => "%#z".to_string(),
            ('X', _) | ('x', _) | ('Z', _) => "%z".to_string(),
            ('z', _) => "%Z".to_string(),
            (other, _) => {
                return Err(invalid(
                    pattern,
                    &format!("unsupported pattern letter '{}'", other),
                ))
            }
        };
        output.push_str(&item);
    }

    Ok(output)
}

fn push_literal(output: &mut String, c: char) {
    if c == '%' {
        output.push_str("%%");
    } else {
        output.push(c);
    }
}

fn invalid(pattern: &str, message: &str) -> Error {
    Error::InvalidRule {
        path: String::new(),
        message: format!("invalid date/time pattern '{}': {}", pattern, message),
    }
}

/// Check that `value` is fully described by `pattern`.
pub fn validate(value: &str, pattern: &str) -> std::result::Result<(), String> {
    let strftime = convert(pattern, Purpose::Parse).map_err(|e| e.to_string())?;
    let mut parsed = Parsed::new();
    parse(&mut parsed, value, StrftimeItems::new(&strftime))
        .map_err(|e| format!("'{}' does not match the pattern '{}': {}", value, pattern, e))?;

    // field ranges were checked while parsing, this catches dates like 2021-02-30
    if parsed.year.is_some() && parsed.month.is_some() && parsed.day.is_some() {
        parsed
            .to_naive_date()
            .map_err(|e| format!("'{}' is not a valid date: {}", value, e))?;
    }

    Ok(())
}

/// Format the current local time with a pattern.
pub fn format_now(pattern: &str) -> Result<String> {
    let strftime = to_strftime(pattern)?;
    Ok(chrono::Local::now().format(&strftime).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_common_patterns() {
        assert_eq!(to_strftime("yyyy-MM-dd").unwrap(), "%Y-%m-%d");
        assert_eq!(
            to_strftime("yyyy-MM-dd'T'HH:mm:ss.SSSXXX").unwrap(),
            "%Y-%m-%dT%H:%M:%S.%3f%:z"
        );
        assert_eq!(to_strftime("EEE, d MMM yyyy").unwrap(), "%a, %-d %b %Y");
        assert!(to_strftime("yyyy 'unterminated").is_err());
        assert!(to_strftime("QQQ").is_err());
    }

    #[test]
    fn validates_values_against_patterns() {
        assert!(validate("2000-01-01", "yyyy-MM-dd").is_ok());
        assert!(validate("2000-13-01", "yyyy-MM-dd").is_err());
        assert!(validate("2021-02-30", "yyyy-MM-dd").is_err());
        assert!(validate("2000-01-01 extra", "yyyy-MM-dd").is_err());
        assert!(validate("14:05:59", "HH:mm:ss").is_ok());
        assert!(validate("2020-05-01T10:00:00.123+02:00", "yyyy-MM-dd'T'HH:mm:ss.SSSXXX").is_ok());
    }

    #[test]
    fn formats_now() {
        let now = format_now(DEFAULT_DATE).unwrap();
        assert!(validate(&now, DEFAULT_DATE).is_ok());
    }
}
