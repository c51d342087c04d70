//! Changes made to replayed requests before they reach the provider, and to
//! provider responses before they are verified.

mod add_header_filter;
mod body_replace_filter;
mod remove_headers_filter;

use crate::model::{Body, HttpRequest, HttpResponse, MultiValueMap};
use add_header_filter::AddHeaderFilter;
use body_replace_filter::{BodyReplaceFilter, BodyReplaceRegexFilter};
use regex::Regex;
use remove_headers_filter::{RemoveHeadersFilter, RemoveHeadersRegexFilter};
use std::fmt::Debug;

pub trait BodyFilter: Debug {
    fn apply(&self, body: &mut String);
}

pub trait HeadersFilter: Debug {
    fn apply(&self, headers: &mut MultiValueMap);
}

#[derive(Debug)]
enum FilterType {
    Body(Box<dyn BodyFilter + Send + Sync>),
    Headers(Box<dyn HeadersFilter + Send + Sync>),
}

impl FilterType {
    fn apply(&self, headers: &mut MultiValueMap, body: &mut Body) {
        match self {
            FilterType::Headers(hf) => hf.apply(headers),
            FilterType::Body(bf) => {
                if let Body::Present { content, content_type } = body {
                    let mut text = String::from_utf8_lossy(content).into_owned();
                    bf.apply(&mut text);
                    *body = Body::with_content_type(text, content_type.clone());
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct RequestFilter {
    filter_type: FilterType,
}

impl RequestFilter {
    fn from_filter_type(filter_type: FilterType) -> Self {
        Self { filter_type }
    }

    pub fn apply(&self, request: &mut HttpRequest) {
        self.filter_type.apply(&mut request.headers, &mut request.body);
    }
}

#[derive(Debug)]
pub struct ResponseFilter {
    filter_type: FilterType,
}

impl ResponseFilter {
    fn from_filter_type(filter_type: FilterType) -> Self {
        Self { filter_type }
    }

    pub fn apply(&self, response: &mut HttpResponse) {
        self.filter_type.apply(&mut response.headers, &mut response.body);
    }
}

pub struct FiltersBuilder {
    filters: Vec<FilterType>,
}

impl FiltersBuilder {
    pub(crate) fn new() -> Self {
        Self { filters: Vec::new() }
    }

    pub fn remove_headers<S: Into<String>, I: IntoIterator<Item = S>>(&mut self, headers: I) -> &mut Self {
        self.add_headers_filter(RemoveHeadersFilter::new(headers))
    }

    pub fn remove_headers_regex<I: IntoIterator<Item = Regex>>(&mut self, patterns: I) -> &mut Self {
        self.add_headers_filter(RemoveHeadersRegexFilter::new(patterns))
    }

    pub fn add_header<S1: Into<String>, S2: Into<String>>(&mut self, header_name: S1, header_value: S2) -> &mut Self {
        self.add_headers_filter(AddHeaderFilter::new(header_name, header_value))
    }

    pub fn body_replace<S1: Into<String>, S2: Into<String>>(&mut self, text: S1, replacement: S2) -> &mut Self {
        self.add_body_filter(BodyReplaceFilter::new(text, replacement))
    }

    pub fn body_replace_regex<S: Into<String>>(&mut self, pattern: Regex, replacement: S) -> &mut Self {
        self.add_body_filter(BodyReplaceRegexFilter::new(pattern, replacement))
    }

    pub fn add_headers_filter<HF: HeadersFilter + Send + Sync + 'static>(&mut self, filter: HF) -> &mut Self {
        self.filters.push(FilterType::Headers(Box::new(filter)));
        self
    }

    pub fn add_body_filter<BF: BodyFilter + Send + Sync + 'static>(&mut self, filter: BF) -> &mut Self {
        self.filters.push(FilterType::Body(Box::new(filter)));
        self
    }

    pub fn into_request_filters(self) -> Vec<RequestFilter> {
        self.filters
            .into_iter()
            .map(RequestFilter::from_filter_type)
            .collect()
    }

    pub fn into_response_filters(self) -> Vec<ResponseFilter> {
        self.filters
            .into_iter()
            .map(ResponseFilter::from_filter_type)
            .collect()
    }
}

impl Default for FiltersBuilder {
    fn default() -> Self {
        Self::new()
    }
}
