use crate::{
    error::Result,
    model::{HttpRequest, HttpResponse},
    util,
};
use async_trait::async_trait;
use hyper::{body, client::HttpConnector, Body, Client, Request};
use hyper_tls::HttpsConnector;
use std::fmt::Debug;
use tracing::debug;

/// Sends replayed requests to the provider.
#[async_trait]
pub trait ProviderClient: Debug + Send + Sync {
    async fn send(&self, base_url: &str, request: &HttpRequest) -> Result<HttpResponse>;
}

/// The default client, speaking HTTP/1.1 with optional TLS.
#[derive(Debug, Clone)]
pub struct HyperProviderClient {
    client: Client<HttpsConnector<HttpConnector>>,
}

impl HyperProviderClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder().build(HttpsConnector::new()),
        }
    }
}

impl Default for HyperProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for HyperProviderClient {
    async fn send(&self, base_url: &str, request: &HttpRequest) -> Result<HttpResponse> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), request.uri());
        debug!(method = %request.method, %url, "Sending request to provider");
        let mut request_builder = Request::builder()
            .uri(url.as_str())
            .method(request.method.as_str());

        if let Some(headers_mut) = request_builder.headers_mut() {
            let mut headers = request.headers.clone();
            headers.retain(|name, _| !name.eq_ignore_ascii_case("host"));
            util::put_headers(headers_mut, &headers)?;
            if !headers_mut.contains_key(hyper::header::CONTENT_TYPE) {
                if let Some(content_type) = request.body.content_type() {
                    headers_mut.insert(
                        hyper::header::CONTENT_TYPE,
                        hyper::header::HeaderValue::from_str(&content_type.to_string())?,
                    );
                }
            }
        }

        let outgoing: Request<Body> = request_builder.body(Body::from(request.body.bytes()))?;
        let response = self.client.request(outgoing).await?;

        let status = response.status().as_u16();
        let headers = util::extract_headers(response.headers());
        let content = body::to_bytes(response.into_body()).await?;

        Ok(HttpResponse {
            status,
            body: util::wire_body(&headers, content),
            headers,
            ..HttpResponse::default()
        })
    }
}
