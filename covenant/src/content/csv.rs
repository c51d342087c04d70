use crate::{
    content::{content_of, expression, Column, ConfiguredContents, ContentHandler},
    content_type::ContentType,
    error::{Error, Result},
    generators::{Generator, Generators, GENERATOR_BODY},
    matching::{rules::match_str_rules, MatchResult, MatchingConfig, Mismatch, MismatchKind},
    model::{matching_rules::CATEGORY_BODY, Body, MatchingRules, RuleCategory, RuleList},
    path::DocPath,
};
use ::csv::{ReaderBuilder, Writer, WriterBuilder};
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const HEADER_ATTRIBUTE: &str = "header";

/// CSV bodies, configured per column:
///
/// ```json
/// { "column:1": "matching(type,'Name')", "column:2": "matching(number,100)" }
/// ```
///
/// Whether the first row holds column names travels with the body as the
/// `header=present|absent` content type attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvHandler;

fn has_headers(content_type: Option<&ContentType>) -> bool {
    content_type
        .and_then(|ct| ct.attribute(HEADER_ATTRIBUTE))
        .map(|value| value.eq_ignore_ascii_case("present"))
        .unwrap_or(false)
}

fn value_str(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(_) | Value::Bool(_) => Ok(value.to_string()),
        other => Err(Error::handler(
            "csv",
            format!("a column definition must be a string, got {}", other),
        )),
    }
}

/// Cells of a parsed document, row by row.
fn cells(document: &Value) -> Vec<Vec<&str>> {
    document
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|fields| fields.iter().filter_map(Value::as_str).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Splits off the header row when the content declares one.
fn split_header<'r, 'v>(
    rows: &'r [Vec<&'v str>],
    headers: bool,
) -> (Option<&'r [&'v str]>, &'r [Vec<&'v str>]) {
    if !headers {
        return (None, rows);
    }
    match rows.split_first() {
        Some((names, data)) => (Some(names.as_slice()), data),
        None => (Some(&[]), rows),
    }
}

impl CsvHandler {
    fn column_rules<'r>(
        rules: &'r RuleCategory,
        index: usize,
        header: Option<&str>,
    ) -> Option<&'r RuleList> {
        let by_index = DocPath::parse(&Column::Index(index + 1).key()).ok();
        let by_name = header.and_then(|h| DocPath::parse(&Column::Name(h.to_string()).key()).ok());
        by_index
            .and_then(|path| rules.rules.get(&path))
            .or_else(|| by_name.and_then(|path| rules.rules.get(&path)))
            .filter(|list| !list.is_empty())
    }

    fn compare_row(
        expected_row: &[&str],
        actual_row: &[&str],
        row_number: usize,
        rules: &RuleCategory,
        headers: Option<(&[&str], &HashMap<&str, usize>)>,
        mismatches: &mut Vec<Mismatch>,
    ) {
        for (index, expected_item) in expected_row.iter().copied().enumerate() {
            let header = headers.and_then(|(names, _)| names.get(index).copied());
            let actual_item = match headers {
                Some((_, positions)) => header
                    .and_then(|h| positions.get(h))
                    .and_then(|position| actual_row.get(*position))
                    .copied(),
                None => actual_row.get(index).copied(),
            };
            let path = Column::Index(index + 1).key();

            let actual_item = match actual_item {
                Some(item) => item,
                None => {
                    mismatches.push(Mismatch::new(
                        path,
                        MismatchKind::Missing,
                        json!(expected_item),
                        Value::Null,
                        format!("Row {}: expected a value for column {}", row_number, index + 1),
                    ));
                    continue;
                }
            };

            match Self::column_rules(rules, index, header) {
                Some(list) => {
                    for mut mismatch in match_str_rules(&path, list, expected_item, actual_item) {
                        mismatch.description = format!("Row {}: {}", row_number, mismatch.description);
                        mismatches.push(mismatch);
                    }
                }
                None if expected_item != actual_item => mismatches.push(Mismatch::new(
                    path,
                    MismatchKind::Value,
                    json!(expected_item),
                    json!(actual_item),
                    format!(
                        "Row {}: expected column {} to equal '{}', but got '{}'",
                        row_number,
                        index + 1,
                        expected_item,
                        actual_item
                    ),
                )),
                None => {}
            }
        }
    }
}

impl ContentHandler for CsvHandler {
    fn name(&self) -> &str {
        "csv"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 2, 0)
    }

    fn handles(&self, content_type: &ContentType) -> bool {
        content_type.sub_type == "csv"
            && (content_type.main_type == "text" || content_type.main_type == "application")
    }

    /// Every record, the header row included, becomes an array of strings.
    fn parse(&self, content: &[u8], _content_type: &ContentType) -> Result<Value> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content);
        let mut rows = vec![];
        for record in reader.records() {
            rows.push(json!(record?.iter().collect::<Vec<_>>()));
        }
        Ok(Value::Array(rows))
    }

    fn render(&self, value: &Value, _content_type: &ContentType) -> Result<Bytes> {
        let rows = value
            .as_array()
            .ok_or_else(|| Error::handler(self.name(), "expected an array of rows"))?;
        let mut writer = WriterBuilder::new().flexible(true).from_writer(vec![]);
        for row in rows {
            let fields: Vec<String> = match row {
                Value::Array(fields) => fields.iter().map(value_str).collect::<Result<_>>()?,
                other => vec![value_str(other)?],
            };
            writer.write_record(&fields)?;
        }

        writer
            .into_inner()
            .map(Bytes::from)
            .map_err(|e| Error::handler(self.name(), e.to_string()))
    }

    fn configure_interaction(
        &self,
        content_type: &ContentType,
        config: &Value,
    ) -> Result<ConfiguredContents> {
        let config = config
            .as_object()
            .ok_or_else(|| Error::handler(self.name(), "no column definitions were provided"))?;

        let mut indexed: Vec<Option<(Column, expression::ValueDefinition)>> = vec![];
        let mut named = vec![];
        for (key, value) in config {
            if !key.starts_with("column:") {
                continue;
            }
            let column = expression::parse_column(key)?;
            let definition = expression::parse_value(&value_str(value)?)?;
            debug!(column = %column.key(), ?definition, "Parsed CSV column definition");
            match column {
                Column::Index(index) => {
                    if index > indexed.len() {
                        indexed.resize(index, None);
                    }
                    indexed[index - 1] = Some((column, definition));
                }
                Column::Name(_) => named.push((column, definition)),
            }
        }

        let columns: Vec<Option<(Column, expression::ValueDefinition)>> = indexed
            .into_iter()
            .chain(named.into_iter().map(Some))
            .collect();
        if columns.is_empty() {
            return Err(Error::handler(self.name(), "no column definitions were provided"));
        }

        let any_named = columns
            .iter()
            .flatten()
            .any(|(column, _)| matches!(column, Column::Name(_)));
        let headers = match config.get("csvHeaders") {
            Some(Value::Bool(headers)) => *headers,
            Some(Value::String(headers)) => headers.eq_ignore_ascii_case("true"),
            _ => any_named,
        };

        let mut writer = Writer::from_writer(vec![]);
        if headers {
            let names: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(index, column)| match column {
                    Some((Column::Name(name), _)) => name.clone(),
                    _ => (index + 1).to_string(),
                })
                .collect();
            writer.write_record(&names)?;
        }
        let values: Vec<&str> = columns
            .iter()
            .map(|column| column.as_ref().map(|(_, d)| d.value.as_str()).unwrap_or_default())
            .collect();
        writer.write_record(&values)?;
        let content = writer
            .into_inner()
            .map_err(|e| Error::handler(self.name(), e.to_string()))?;

        let mut rules = MatchingRules::default();
        let mut generators = Generators::default();
        for (column, definition) in columns.into_iter().flatten() {
            let path = DocPath::parse(&column.key())?;
            if let Some(rule) = definition.rule {
                rules.add_rule(CATEGORY_BODY, path.clone(), rule);
            }
            if let Some(generator) = definition.generator {
                generators.add(GENERATOR_BODY, path, generator);
            }
        }

        let content_type = ContentType::parse(&content_type.base_type())?
            .with_attribute("charset", "UTF-8")
            .with_attribute(HEADER_ATTRIBUTE, if headers { "present" } else { "absent" });

        Ok(ConfiguredContents {
            body: Body::with_content_type(content, content_type),
            rules,
            generators,
        })
    }

    fn compare_contents(
        &self,
        expected: &Body,
        actual: &Body,
        rules: &RuleCategory,
        config: MatchingConfig,
    ) -> Result<MatchResult> {
        let expected_content = content_of(self.name(), expected)?;
        let actual_content = match actual.content() {
            Some(content) => content,
            None => {
                return Ok(MatchResult::Mismatched(vec![Mismatch::new(
                    "$",
                    MismatchKind::Body,
                    Value::String(expected.as_str().unwrap_or_default().into_owned()),
                    Value::Null,
                    "Expected CSV content, but did not get any",
                )]))
            }
        };

        let content_type = expected.content_type().cloned().unwrap_or_else(ContentType::csv);
        let expected_document = self.parse(expected_content, &content_type)?;
        let actual_document = match self.parse(actual_content, &content_type) {
            Ok(document) => document,
            Err(error) => {
                return Ok(MatchResult::Mismatched(vec![Mismatch::new(
                    "$",
                    MismatchKind::Unparseable,
                    Value::Null,
                    Value::String(actual.as_str().unwrap_or_default().into_owned()),
                    format!("The CSV content could not be read: {}", error),
                )]))
            }
        };

        let headers = has_headers(Some(&content_type));
        let expected_cells = cells(&expected_document);
        let actual_cells = cells(&actual_document);
        let (expected_names, expected_rows) = split_header(&expected_cells, headers);
        let (actual_names, actual_rows) = split_header(&actual_cells, headers);

        let mut mismatches = vec![];
        let header_maps = expected_names.map(|expected_names| {
            let positions: HashMap<&str, usize> = actual_names
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(position, name)| (*name, position))
                .collect();
            for name in expected_names {
                if !positions.contains_key(name) {
                    mismatches.push(Mismatch::new(
                        format!("column:{}", name),
                        MismatchKind::Missing,
                        json!(name),
                        Value::Null,
                        format!("Expected a column '{}', but it was missing", name),
                    ));
                }
            }
            (expected_names, positions)
        });

        let expected_row = expected_rows
            .first()
            .ok_or_else(|| Error::handler(self.name(), "the expected content has no rows"))?;

        for (position, record) in actual_rows.iter().enumerate() {
            let row_number = position + 1;
            if header_maps.is_none() {
                if record.len() < expected_row.len() {
                    mismatches.push(Mismatch::new(
                        format!("row:{}", row_number),
                        MismatchKind::Length,
                        json!(expected_row.len()),
                        json!(record.len()),
                        format!(
                            "Row {}: expected {} columns, but got {}",
                            row_number,
                            expected_row.len(),
                            record.len()
                        ),
                    ));
                } else if record.len() > expected_row.len() && !config.allow_unexpected_keys {
                    mismatches.push(Mismatch::new(
                        format!("row:{}", row_number),
                        MismatchKind::Unexpected,
                        json!(expected_row.len()),
                        json!(record.len()),
                        format!(
                            "Row {}: expected at most {} columns, but got {}",
                            row_number,
                            expected_row.len(),
                            record.len()
                        ),
                    ));
                }
            }

            Self::compare_row(
                expected_row,
                record,
                row_number,
                rules,
                header_maps.as_ref().map(|(names, positions)| (*names, positions)),
                &mut mismatches,
            );
        }

        if actual_rows.is_empty() {
            mismatches.push(Mismatch::new(
                "$",
                MismatchKind::Body,
                Value::String(expected.as_str().unwrap_or_default().into_owned()),
                Value::String(actual.as_str().unwrap_or_default().into_owned()),
                "Expected at least one CSV row, but got none",
            ));
        }

        Ok(MatchResult::from_mismatches(mismatches))
    }

    fn generate_contents(
        &self,
        body: &Body,
        generators: &BTreeMap<DocPath, Generator>,
        context: &Map<String, Value>,
    ) -> Result<Body> {
        let content = content_of(self.name(), body)?;
        let content_type = body.content_type().cloned().unwrap_or_else(ContentType::csv);
        let headers = has_headers(Some(&content_type));
        let mut document = self.parse(content, &content_type)?;

        let by_column: HashMap<String, &Generator> = generators
            .iter()
            .map(|(path, generator)| (path.as_str().to_string(), generator))
            .collect();

        if let Some(rows) = document.as_array_mut() {
            let names: Option<Vec<String>> = if headers {
                rows.first().and_then(Value::as_array).map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
            } else {
                None
            };

            for row in rows.iter_mut().skip(usize::from(headers)) {
                let fields = match row.as_array_mut() {
                    Some(fields) => fields,
                    None => continue,
                };
                for (index, field) in fields.iter_mut().enumerate() {
                    let by_name = names
                        .as_ref()
                        .and_then(|names| names.get(index))
                        .and_then(|name| by_column.get(&Column::Name(name.clone()).key()));
                    let generator = by_name.or_else(|| by_column.get(&Column::Index(index + 1).key()));
                    if let Some(generator) = generator {
                        *field = Value::String(generator.generate_string(context)?);
                    }
                }
            }
        }

        let generated = self.render(&document, &content_type)?;
        Ok(Body::with_content_type(generated, content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_contents() -> ConfiguredContents {
        CsvHandler
            .configure_interaction(
                &ContentType::csv(),
                &json!({
                    "column:1": "matching(type,'Name')",
                    "column:2": "matching(number,100)",
                    "column:3": "matching(datetime, 'yyyy-MM-dd','2000-01-01')"
                }),
            )
            .unwrap()
    }

    fn compare(contents: &ConfiguredContents, actual: &str) -> MatchResult {
        let rules = contents.rules.category(CATEGORY_BODY).unwrap();
        CsvHandler
            .compare_contents(
                &contents.body,
                &Body::with_content_type(actual.to_string(), ContentType::csv()),
                rules,
                MatchingConfig::default(),
            )
            .unwrap()
    }

    #[test]
    fn builds_example_row_without_headers() {
        let contents = report_contents();
        assert_eq!(contents.body.as_str().unwrap(), "Name,100,2000-01-01\n");
        assert_eq!(
            contents.body.content_type().unwrap().attribute("header"),
            Some("absent")
        );
        assert!(contents
            .generators
            .category(GENERATOR_BODY)
            .unwrap()
            .contains_key(&DocPath::parse("column:3").unwrap()));
    }

    #[test]
    fn matching_rows_pass() {
        let contents = report_contents();
        assert!(compare(&contents, "Name,100,2000-01-01\n").is_match());
        assert!(compare(&contents, "Other,250.5,2021-12-31\nMore,1,1999-01-01\n").is_match());
    }

    #[test]
    fn bad_number_fails_at_column_two() {
        let contents = report_contents();
        let result = compare(&contents, "Name,abc,2000-01-01\n");
        let mismatches = result.mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].path, "column:2");
        assert_eq!(mismatches[0].kind, MismatchKind::Rule("number".into()));
        assert!(mismatches[0].description.starts_with("Row 1"));
    }

    #[test]
    fn short_rows_are_reported() {
        let contents = report_contents();
        let result = compare(&contents, "Name,100\n");
        assert!(result
            .mismatches()
            .iter()
            .any(|m| m.kind == MismatchKind::Length));
    }

    #[test]
    fn named_columns_use_a_header_row() {
        let contents = CsvHandler
            .configure_interaction(
                &ContentType::csv(),
                &json!({"column:name": "matching(type,'Alice')", "column:age": "matching(integer, 30)"}),
            )
            .unwrap();
        assert_eq!(
            contents.body.content_type().unwrap().attribute("header"),
            Some("present")
        );
        let rules = contents.rules.category(CATEGORY_BODY).unwrap();

        let actual = Body::with_content_type("age,name\n41,Bob\n", ContentType::csv());
        let result = CsvHandler
            .compare_contents(&contents.body, &actual, rules, MatchingConfig::default())
            .unwrap();
        assert!(result.is_match(), "{:?}", result);

        let actual = Body::with_content_type("name\nBob\n", ContentType::csv());
        let result = CsvHandler
            .compare_contents(&contents.body, &actual, rules, MatchingConfig::default())
            .unwrap();
        assert!(!result.is_match());
    }

    #[test]
    fn generates_fresh_dates() {
        let contents = report_contents();
        let generated = CsvHandler
            .generate_contents(
                &contents.body,
                contents.generators.category(GENERATOR_BODY).unwrap(),
                &Map::new(),
            )
            .unwrap();
        let text = generated.as_str().unwrap().into_owned();
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(text, format!("Name,100,{}\n", today));
    }

    #[test]
    fn rendering_a_parsed_document_gives_back_the_content() {
        let content_type = ContentType::csv().with_attribute(HEADER_ATTRIBUTE, "present");
        for content in ["name,age\nAlice,30\nBob,41\n", "Name,100,2000-01-01\n", "a,\"b,c\"\nd\n"] {
            let document = CsvHandler.parse(content.as_bytes(), &content_type).unwrap();
            let rendered = CsvHandler.render(&document, &content_type).unwrap();
            assert_eq!(rendered, content.as_bytes());
        }
    }

    #[test]
    fn header_row_is_the_first_parsed_row() {
        let content_type = ContentType::csv().with_attribute(HEADER_ATTRIBUTE, "present");
        let document = CsvHandler.parse(b"name,age\nAlice,30\n", &content_type).unwrap();
        assert_eq!(document, json!([["name", "age"], ["Alice", "30"]]));
    }

    #[test]
    fn rejects_invalid_column_keys() {
        let error = CsvHandler
            .configure_interaction(&ContentType::csv(), &json!({"column:0": "x"}))
            .unwrap_err();
        assert!(matches!(error, Error::InvalidRule { .. }));
    }
}
