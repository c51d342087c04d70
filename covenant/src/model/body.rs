use crate::{
    content_type::ContentType,
    error::{Error, Result},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde_json::{json, Value};
use std::fmt::{self, Display};

/// Contents of a request, response or message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Body {
    /// No body was specified; any actual body is accepted.
    #[default]
    Missing,
    /// The body must be empty.
    Empty,
    Present {
        content: Bytes,
        content_type: ContentType,
    },
}

impl Body {
    pub fn json(value: &Value) -> Self {
        Body::Present {
            content: Bytes::from(value.to_string()),
            content_type: ContentType::json(),
        }
    }

    pub fn text<S: Into<String>>(text: S) -> Self {
        Body::Present {
            content: Bytes::from(text.into()),
            content_type: ContentType::text(),
        }
    }

    pub fn with_content_type<B: Into<Bytes>>(content: B, content_type: ContentType) -> Self {
        let content = content.into();
        if content.is_empty() {
            Body::Empty
        } else {
            Body::Present {
                content,
                content_type,
            }
        }
    }

    /// Bytes received over the wire with an optional declared content type.
    pub fn from_bytes<B: Into<Bytes>>(content: B, declared: Option<ContentType>) -> Self {
        let content = content.into();
        if content.is_empty() {
            return Body::Empty;
        }
        let content_type = declared.unwrap_or_else(|| ContentType::detect(&content));
        Body::Present {
            content,
            content_type,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Body::Present { .. })
    }

    pub fn content(&self) -> Option<&Bytes> {
        match self {
            Body::Present { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Bytes {
        self.content().cloned().unwrap_or_default()
    }

    pub fn content_type(&self) -> Option<&ContentType> {
        match self {
            Body::Present { content_type, .. } => Some(content_type),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<std::borrow::Cow<'_, str>> {
        self.content().map(|c| String::from_utf8_lossy(c))
    }

    /// Parse a JSON body. `None` for missing or empty bodies.
    pub fn as_json(&self) -> Option<Result<Value>> {
        self.content()
            .map(|c| serde_json::from_slice(c).map_err(Error::from))
    }

    pub fn to_v4_json(&self) -> Value {
        match self {
            Body::Missing => Value::Null,
            Body::Empty => json!({ "content": "" }),
            Body::Present {
                content,
                content_type,
            } => {
                let json_content = if content_type.is_json() {
                    serde_json::from_slice::<Value>(content).ok()
                } else {
                    None
                };

                match (json_content, std::str::from_utf8(content)) {
                    (Some(value), _) => json!({
                        "content": value,
                        "contentType": content_type.to_string(),
                        "encoded": false
                    }),
                    (None, Ok(text)) if content_type.is_text() => json!({
                        "content": text,
                        "contentType": content_type.to_string(),
                        "encoded": false
                    }),
                    _ => json!({
                        "content": STANDARD.encode(content),
                        "contentType": content_type.to_string(),
                        "encoded": "base64"
                    }),
                }
            }
        }
    }

    /// Read a V4 body document. `header_type` is the content type from the
    /// surrounding headers, used when the document does not name one.
    pub fn from_v4_json(value: &Value, header_type: Option<&ContentType>) -> Result<Self> {
        let document = match value {
            Value::Null => return Ok(Body::Missing),
            Value::Object(document) => document,
            other => {
                return Err(Error::persistence(
                    None,
                    format!("expected a body object, got {}", other),
                ))
            }
        };

        let declared = match document.get("contentType").and_then(Value::as_str) {
            Some(content_type) => Some(ContentType::parse(content_type)?),
            None => header_type.cloned(),
        };

        let content = match document.get("content") {
            None | Some(Value::Null) => return Ok(Body::Missing),
            Some(content) => content,
        };

        let encoded = match document.get("encoded") {
            Some(Value::String(encoding)) => encoding.eq_ignore_ascii_case("base64"),
            Some(Value::Bool(encoded)) => *encoded,
            _ => false,
        };

        let bytes = match content {
            Value::String(text) if encoded => STANDARD
                .decode(text)
                .map_err(|e| Error::persistence(None, format!("invalid base64 body: {}", e)))?,
            Value::String(text) => {
                let is_json = declared.as_ref().map(ContentType::is_json).unwrap_or(false);
                if is_json {
                    // a JSON string body is stored as the string value itself
                    Value::String(text.clone()).to_string().into_bytes()
                } else {
                    text.clone().into_bytes()
                }
            }
            other => other.to_string().into_bytes(),
        };

        let declared = declared.or_else(|| {
            if content.is_object() || content.is_array() {
                Some(ContentType::json())
            } else {
                None
            }
        });

        Ok(Body::from_bytes(bytes, declared))
    }

    /// Read a pre-V4 body which is the raw JSON value or a string.
    pub fn from_legacy_json(value: Option<&Value>, header_type: Option<&ContentType>) -> Self {
        match value {
            None => Body::Missing,
            Some(Value::Null) => Body::Empty,
            Some(Value::String(text)) => {
                let is_json = header_type.map(ContentType::is_json).unwrap_or(false);
                if text.is_empty() {
                    Body::Empty
                } else if is_json {
                    Body::from_bytes(text.clone(), header_type.cloned())
                } else {
                    Body::from_bytes(
                        text.clone(),
                        Some(header_type.cloned().unwrap_or_else(ContentType::text)),
                    )
                }
            }
            Some(other) => Body::Present {
                content: Bytes::from(other.to_string()),
                content_type: header_type
                    .filter(|ct| ct.is_json())
                    .cloned()
                    .unwrap_or_else(ContentType::json),
            },
        }
    }
}

impl Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Missing => write!(f, "<missing>"),
            Body::Empty => write!(f, "<empty>"),
            Body::Present {
                content,
                content_type,
            } => match std::str::from_utf8(content) {
                Ok(text) => write!(f, "{} ({})", text, content_type),
                Err(_) => write!(f, "{} bytes ({})", content.len(), content_type),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_bodies_are_stored_as_values() {
        let body = Body::json(&json!({"value": 12}));
        assert_eq!(
            body.to_v4_json(),
            json!({"content": {"value": 12}, "contentType": "application/json", "encoded": false})
        );
        assert_eq!(Body::from_v4_json(&body.to_v4_json(), None).unwrap(), body);
    }

    #[test]
    fn binary_bodies_are_base64_encoded() {
        let body = Body::with_content_type(vec![0u8, 159, 146, 150], ContentType::octet_stream());
        let document = body.to_v4_json();
        assert_eq!(document["encoded"], json!("base64"));
        assert_eq!(Body::from_v4_json(&document, None).unwrap(), body);
    }

    #[test]
    fn content_type_falls_back_to_headers_then_detection() {
        let csv = ContentType::csv();
        let body = Body::from_v4_json(&json!({"content": "Name,100"}), Some(&csv)).unwrap();
        assert_eq!(body.content_type(), Some(&csv));

        let body = Body::from_v4_json(&json!({"content": "plain words"}), None).unwrap();
        assert_eq!(body.content_type(), Some(&ContentType::text()));
    }

    #[test]
    fn empty_content_is_an_empty_body() {
        assert_eq!(Body::from_v4_json(&json!({"content": ""}), None).unwrap(), Body::Empty);
        assert_eq!(Body::from_v4_json(&Value::Null, None).unwrap(), Body::Missing);
    }

    #[test]
    fn legacy_bodies_are_raw_values() {
        let body = Body::from_legacy_json(Some(&json!({"a": [1, 2]})), None);
        assert_eq!(body.as_json().unwrap().unwrap(), json!({"a": [1, 2]}));
        assert_eq!(Body::from_legacy_json(None, None), Body::Missing);
    }
}
