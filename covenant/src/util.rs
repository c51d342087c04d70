use crate::{
    content_type::ContentType,
    error::Result,
    model::{interaction::find_header, Body, MultiValueMap},
};
use hyper::{
    header::{HeaderName, HeaderValue},
    HeaderMap,
};

pub(crate) fn extract_headers(header_map: &HeaderMap) -> MultiValueMap {
    // it currently ignores header values with opaque characters
    let mut headers = MultiValueMap::new();
    for (key, value) in header_map {
        if let Ok(value) = value.to_str() {
            headers
                .entry(key.as_str().to_string())
                .or_insert_with(Vec::new)
                .push(value.to_string());
        }
    }
    headers
}

pub(crate) fn put_headers(header_map: &mut HeaderMap<HeaderValue>, headers: &MultiValueMap) -> Result<()> {
    for (key, values) in filter_headers(headers) {
        let header_name = HeaderName::from_lowercase(key.to_lowercase().as_bytes())?;
        for value in values {
            header_map.append(header_name.clone(), HeaderValue::from_str(value)?);
        }
    }

    Ok(())
}

/// Headers that describe the original framing. The body is always written in
/// full, so hyper sets these itself.
fn filter_headers(headers: &MultiValueMap) -> impl Iterator<Item = (&String, &Vec<String>)> {
    headers.iter().filter(|(key, _)| {
        !key.eq_ignore_ascii_case("transfer-encoding") && !key.eq_ignore_ascii_case("content-length")
    })
}

pub(crate) fn parse_query(query: Option<&str>) -> MultiValueMap {
    let mut parsed = MultiValueMap::new();
    if let Some(query) = query {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            parsed
                .entry(name.into_owned())
                .or_insert_with(Vec::new)
                .push(value.into_owned());
        }
    }
    parsed
}

/// A body read from the wire, typed by its `Content-Type` header.
pub(crate) fn wire_body(headers: &MultiValueMap, content: bytes::Bytes) -> Body {
    let declared = find_header(headers, "content-type")
        .and_then(|values| values.first())
        .and_then(|value| ContentType::parse(value).ok());
    Body::from_bytes(content, declared)
}
