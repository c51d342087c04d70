//! The small expression language used to configure plugin contents, e.g.
//! `matching(type,'Name')`, `matching(datetime, 'yyyy-MM-dd','2000-01-01')`
//! or `fromProviderState('${id}', '100')`, and `column:2` field locators.

use crate::{
    error::{Error, Result},
    generators::Generator,
    model::MatchingRule,
};
use logos::{Lexer, Logos};

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum FieldToken {
    #[token("column")]
    Column,

    #[token(":")]
    Colon,

    #[regex("[0-9]+")]
    Int,

    #[regex("[a-zA-Z_][a-zA-Z0-9_ -]*")]
    Name,
}

/// A CSV column locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    /// 1-based column index.
    Index(usize),
    Name(String),
}

impl Column {
    pub fn key(&self) -> String {
        match self {
            Column::Index(index) => format!("column:{}", index),
            Column::Name(name) => format!("column:{}", name),
        }
    }
}

fn invalid(source: &str, message: String) -> Error {
    Error::InvalidRule {
        path: source.to_string(),
        message,
    }
}

/// Parse `column:N` or `column:name`.
pub fn parse_column(source: &str) -> Result<Column> {
    let mut lexer = FieldToken::lexer(source);
    if lexer.next() != Some(Ok(FieldToken::Column)) {
        return Err(invalid(source, "expected 'column'".into()));
    }
    if lexer.next() != Some(Ok(FieldToken::Colon)) {
        return Err(invalid(source, "expected ':' after 'column'".into()));
    }

    let column = match lexer.next() {
        Some(Ok(FieldToken::Int)) => {
            let index: usize = lexer
                .slice()
                .parse()
                .map_err(|_| invalid(source, "column index is too large".into()))?;
            if index < 1 {
                return Err(invalid(
                    source,
                    format!("expected a column index >= 1, got {}", index),
                ));
            }
            Column::Index(index)
        }
        Some(Ok(FieldToken::Name)) | Some(Ok(FieldToken::Column)) => {
            Column::Name(lexer.slice().trim().to_string())
        }
        _ => {
            return Err(invalid(
                source,
                format!("expected a column index or name, got '{}'", lexer.remainder()),
            ))
        }
    };

    match lexer.next() {
        None => Ok(column),
        Some(_) => Err(invalid(
            source,
            format!("unexpected '{}' after the column", lexer.slice()),
        )),
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum ValueToken {
    #[token("matching")]
    Matching,

    #[token("fromProviderState")]
    FromProviderState,

    #[token("(")]
    LeftBracket,

    #[token(")")]
    RightBracket,

    #[token(",")]
    Comma,

    #[regex("'[^']*'")]
    String,

    #[regex("[a-zA-Z]+")]
    Id,

    #[regex("-?[0-9]+")]
    Int,

    #[regex(r"-?[0-9]+\.[0-9]+")]
    Decimal,
}

/// The example value of a field with the rule and generator it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDefinition {
    pub value: String,
    pub rule: Option<MatchingRule>,
    pub generator: Option<Generator>,
}

impl ValueDefinition {
    fn literal(value: &str) -> Self {
        Self {
            value: value.to_string(),
            rule: None,
            generator: None,
        }
    }
}

struct Parser<'s> {
    source: &'s str,
    lexer: Lexer<'s, ValueToken>,
}

impl<'s> Parser<'s> {
    fn next(&mut self, expected: &str) -> Result<ValueToken> {
        match self.lexer.next() {
            Some(Ok(token)) => Ok(token),
            Some(Err(_)) => Err(self.error(format!(
                "expected {}, got unrecognised '{}'",
                expected,
                self.lexer.slice()
            ))),
            None => Err(self.error(format!("expected {}, got the end of input", expected))),
        }
    }

    fn error(&self, message: String) -> Error {
        invalid(self.source, message)
    }

    fn expect(&mut self, token: ValueToken, name: &str) -> Result<()> {
        let found = self.next(name)?;
        if found == token {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, got '{}'", name, self.lexer.slice())))
        }
    }

    fn string(&mut self) -> Result<String> {
        self.expect(ValueToken::String, "a quoted string")?;
        Ok(self.lexer.slice().trim_matches('\'').to_string())
    }

    fn number(&mut self, integer_only: bool) -> Result<String> {
        match self.next("a number")? {
            ValueToken::Int => Ok(self.lexer.slice().to_string()),
            ValueToken::Decimal if !integer_only => Ok(self.lexer.slice().to_string()),
            _ => Err(self.error(format!("expected a number, got '{}'", self.lexer.slice()))),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self.lexer.next() {
            None => Ok(()),
            Some(_) => Err(self.error(format!(
                "unexpected '{}' after the closing bracket",
                self.lexer.slice()
            ))),
        }
    }

    fn matching(&mut self) -> Result<ValueDefinition> {
        self.expect(ValueToken::LeftBracket, "'('")?;
        self.expect(ValueToken::Id, "a matcher type")?;
        let kind = self.lexer.slice().to_string();
        self.expect(ValueToken::Comma, "','")?;

        let (value, rule, generator) = match kind.as_str() {
            "equality" => (self.string()?, MatchingRule::Equality, None),
            "type" => (self.string()?, MatchingRule::Type, None),
            "regex" => {
                let regex = self.string()?;
                self.expect(ValueToken::Comma, "','")?;
                (self.string()?, MatchingRule::Regex(regex), None)
            }
            "datetime" | "timestamp" => {
                let format = self.string()?;
                self.expect(ValueToken::Comma, "','")?;
                let generator = Generator::DateTime(Some(format.clone()));
                (self.string()?, MatchingRule::Timestamp(format), Some(generator))
            }
            "date" => {
                let format = self.string()?;
                self.expect(ValueToken::Comma, "','")?;
                let generator = Generator::Date(Some(format.clone()));
                (self.string()?, MatchingRule::Date(format), Some(generator))
            }
            "time" => {
                let format = self.string()?;
                self.expect(ValueToken::Comma, "','")?;
                let generator = Generator::Time(Some(format.clone()));
                (self.string()?, MatchingRule::Time(format), Some(generator))
            }
            "include" => {
                let value = self.string()?;
                (value.clone(), MatchingRule::Include(value), None)
            }
            "number" => (self.number(false)?, MatchingRule::Number, None),
            "integer" => (self.number(true)?, MatchingRule::Integer, None),
            "decimal" => (self.number(false)?, MatchingRule::Decimal, None),
            "boolean" => {
                self.expect(ValueToken::Id, "a boolean")?;
                let value = self.lexer.slice().to_string();
                if value != "true" && value != "false" {
                    return Err(self.error(format!("expected a boolean, got '{}'", value)));
                }
                (value, MatchingRule::Boolean, None)
            }
            "semver" => (self.string()?, MatchingRule::Semver, None),
            "notEmpty" => (self.string()?, MatchingRule::NotEmpty, None),
            other => return Err(self.error(format!("unknown matcher type '{}'", other))),
        };

        self.expect(ValueToken::RightBracket, "')'")?;
        self.finish()?;

        Ok(ValueDefinition {
            value,
            rule: Some(rule),
            generator,
        })
    }

    fn from_provider_state(&mut self) -> Result<ValueDefinition> {
        self.expect(ValueToken::LeftBracket, "'('")?;
        let expression = self.string()?;
        self.expect(ValueToken::Comma, "','")?;
        let value = self.string()?;
        self.expect(ValueToken::RightBracket, "')'")?;
        self.finish()?;

        Ok(ValueDefinition {
            value,
            rule: Some(MatchingRule::Type),
            generator: Some(Generator::ProviderState {
                expression,
                data_type: None,
            }),
        })
    }
}

/// Parse a value definition. Anything that is not an expression is a
/// literal example value.
pub fn parse_value(source: &str) -> Result<ValueDefinition> {
    let mut parser = Parser {
        source,
        lexer: ValueToken::lexer(source),
    };

    match parser.lexer.next() {
        Some(Ok(ValueToken::Matching)) => parser.matching(),
        Some(Ok(ValueToken::FromProviderState)) => parser.from_provider_state(),
        _ => Ok(ValueDefinition::literal(source)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_column_locators() {
        assert_eq!(parse_column("column:2").unwrap(), Column::Index(2));
        assert_eq!(parse_column("column: 3").unwrap(), Column::Index(3));
        assert_eq!(
            parse_column("column:Date of birth").unwrap(),
            Column::Name("Date of birth".into())
        );
        assert!(parse_column("column:0").is_err());
        assert!(parse_column("row:1").is_err());
        assert!(parse_column("column").is_err());
    }

    #[test]
    fn parses_matching_expressions() {
        let definition = parse_value("matching(type,'Name')").unwrap();
        assert_eq!(definition.value, "Name");
        assert_eq!(definition.rule, Some(MatchingRule::Type));

        let definition = parse_value("matching(number,100)").unwrap();
        assert_eq!(definition.value, "100");
        assert_eq!(definition.rule, Some(MatchingRule::Number));

        let definition = parse_value("matching(datetime, 'yyyy-MM-dd','2000-01-01')").unwrap();
        assert_eq!(definition.value, "2000-01-01");
        assert_eq!(definition.rule, Some(MatchingRule::Timestamp("yyyy-MM-dd".into())));
        assert_eq!(
            definition.generator,
            Some(Generator::DateTime(Some("yyyy-MM-dd".into())))
        );

        let definition = parse_value("matching(regex, '\\d+', '12')").unwrap();
        assert_eq!(definition.rule, Some(MatchingRule::Regex("\\d+".into())));

        let definition = parse_value("matching(decimal, -1.5)").unwrap();
        assert_eq!(definition.value, "-1.5");
    }

    #[test]
    fn literals_pass_through() {
        let definition = parse_value("just a value").unwrap();
        assert_eq!(definition.value, "just a value");
        assert!(definition.rule.is_none());
    }

    #[test]
    fn reports_malformed_expressions() {
        assert!(parse_value("matching(number,'x')").is_err());
        assert!(parse_value("matching(integer, 1.5)").is_err());
        assert!(parse_value("matching(type,'a'").is_err());
        assert!(parse_value("matching(type,'a') trailing").is_err());
        assert!(parse_value("matching(unknown,'a')").is_err());
        assert!(parse_value("matching(boolean, maybe)").is_err());
    }

    #[test]
    fn provider_state_values_generate() {
        let definition = parse_value("fromProviderState('${id}', '100')").unwrap();
        assert_eq!(definition.value, "100");
        assert!(matches!(
            definition.generator,
            Some(Generator::ProviderState { ref expression, .. }) if expression == "${id}"
        ));
    }
}
