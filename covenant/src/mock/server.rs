use super::{
    state::{MockState, Outcome},
    MockServerConfig,
};
use crate::{
    error::{Error, Result},
    model::{HttpRequest, HttpResponse, Interaction, Pact},
    report::{self, Failure},
    util,
};
use hyper::{
    body,
    header::{HeaderValue, CONTENT_TYPE},
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server,
};
use serde_json::json;
use std::{
    convert::Infallible,
    net::{SocketAddr, TcpListener},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};
use tokio::{runtime, sync::oneshot};
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug)]
struct Shared {
    config: MockServerConfig,
    state: Mutex<MockState>,
}

/// A mock provider serving a set of interactions on its own thread.
///
/// Dropping the server stops it. Use [`MockServer::stop`] to also get the
/// verification result.
#[derive(Debug)]
pub struct MockServer {
    address: SocketAddr,
    shared: Arc<Shared>,
    shutdown: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Serve the HTTP interactions of a pact.
    pub fn for_pact(pact: &Pact, config: MockServerConfig) -> Result<Self> {
        Self::start(pact.interactions.iter().cloned(), config)
    }

    pub fn start<I: IntoIterator<Item = Interaction>>(interactions: I, config: MockServerConfig) -> Result<Self> {
        let addr = SocketAddr::new(config.host(), config.port());
        let listener = TcpListener::bind(addr).map_err(|source| Error::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| Error::Bind { addr, source })?;
        let address = listener
            .local_addr()
            .map_err(|source| Error::Bind { addr, source })?;

        let runtime = runtime::Builder::new_current_thread().enable_all().build()?;
        let grace = config.shutdown_grace();
        let shared = Arc::new(Shared {
            state: Mutex::new(MockState::new(interactions)),
            config,
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), hyper::Error>>();

        let service_shared = shared.clone();
        let join_handle = thread::Builder::new()
            .name(format!("covenant-mock-{}", address.port()))
            .spawn(move || {
                runtime.block_on(async move {
                    let builder = match Server::from_tcp(listener) {
                        Ok(builder) => builder,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let server = builder.serve(make_service_fn(move |_| {
                        let shared = service_shared.clone();
                        async move {
                            Ok::<_, Infallible>(service_fn(move |req| handle_request(shared.clone(), req)))
                        }
                    }));
                    let _ = ready_tx.send(Ok(()));

                    let (drain_tx, drain_rx) = oneshot::channel::<()>();
                    let server = server.with_graceful_shutdown(async {
                        let _ = drain_rx.await;
                    });
                    tokio::pin!(server);

                    tokio::select! {
                        result = &mut server => {
                            if let Err(e) = result {
                                error!(%address, "Mock server error: {}", e);
                            }
                        }
                        _ = shutdown_rx => {
                            let _ = drain_tx.send(());
                            match tokio::time::timeout(grace, &mut server).await {
                                Ok(Err(e)) => error!(%address, "Mock server error: {}", e),
                                Ok(Ok(())) => debug!(%address, "Mock server drained"),
                                Err(_) => warn!(
                                    %address,
                                    grace_ms = grace.as_millis() as u64,
                                    "Mock server did not drain in time, closing open connections"
                                ),
                            }
                        }
                    }
                });
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(Error::Transport("the mock server thread exited on start".into())),
        }
        info!(%address, "Mock server started");

        Ok(Self {
            address,
            shared,
            shutdown: Some(shutdown_tx),
            join_handle: Some(join_handle),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// Base URL of the server, without a trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// A URL for `path` on this server.
    pub fn path<S: AsRef<str>>(&self, path: S) -> String {
        format!("{}{}", self.url(), path.as_ref())
    }

    /// Failures so far, including interactions not matched yet.
    pub fn report(&self) -> Vec<Failure> {
        match self.shared.state.lock() {
            Ok(state) => state.report(),
            Err(_) => vec![Failure::InteractionError {
                description: "mock server".into(),
                message: Error::PoisonedLock.to_string(),
            }],
        }
    }

    /// Requests received so far, in arrival order.
    pub fn observed_requests(&self) -> Vec<HttpRequest> {
        self.shared
            .state
            .lock()
            .map(|state| state.observed().to_vec())
            .unwrap_or_default()
    }

    /// How many requests the interaction with this description answered.
    pub fn match_count(&self, description: &str) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| state.match_count(description))
            .unwrap_or_default()
    }

    /// Stop serving and return every failure collected during the run.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown();
        report::into_result(self.report())
    }

    fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                error!(address = %self.address, "The mock server thread panicked");
            } else {
                info!(address = %self.address, "Mock server stopped");
            }
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_request(shared: Arc<Shared>, request: Request<Body>) -> std::result::Result<Response<Body>, Infallible> {
    let span = info_span!("mock_request", method = %request.method(), path = %request.uri().path());
    async move {
        let cors = shared.config.cors_preflight();
        let result = if cors && is_preflight(&request) {
            debug!("Answering CORS pre-flight request");
            preflight_response(&request)
        } else {
            respond(&shared, request).await
        };

        let mut response = result.unwrap_or_else(|e| {
            error!("Mock server failed to answer: {}", e);
            error_response(&e.to_string())
        });
        if cors {
            response
                .headers_mut()
                .insert("access-control-allow-origin", HeaderValue::from_static("*"));
        }
        Ok(response)
    }
    .instrument(span)
    .await
}

async fn respond(shared: &Shared, request: Request<Body>) -> Result<Response<Body>> {
    let request = read_request(request).await?;
    debug!(?request, "Received request");

    let registry = shared.config.registry();
    let outcome = shared
        .state
        .lock()?
        .handle(request, &shared.config, &registry);

    match outcome {
        Outcome::Respond { description, response } => {
            debug!(%description, status = response.status, "Request matched");
            write_response(&response)
        }
        Outcome::Unmatched(failure) => {
            let document = json!({
                "error": failure.to_string(),
                "failure": failure,
            });
            Ok(json_response(500, &document))
        }
        Outcome::Error(message) => Ok(error_response(&message)),
    }
}

async fn read_request(request: Request<Body>) -> Result<HttpRequest> {
    let (parts, body) = request.into_parts();
    let headers = util::extract_headers(&parts.headers);
    let content = body::to_bytes(body).await?;

    Ok(HttpRequest {
        method: parts.method.as_str().to_uppercase(),
        path: parts.uri.path().to_string(),
        query: util::parse_query(parts.uri.query()),
        body: util::wire_body(&headers, content),
        headers,
        ..HttpRequest::default()
    })
}

fn write_response(response: &HttpResponse) -> Result<Response<Body>> {
    let mut response_builder = Response::builder().status(response.status);
    if let Some(header_map) = response_builder.headers_mut() {
        util::put_headers(header_map, &response.headers)?;
        if !header_map.contains_key(CONTENT_TYPE) {
            if let Some(content_type) = response.body.content_type() {
                header_map.insert(CONTENT_TYPE, HeaderValue::from_str(&content_type.to_string())?);
            }
        }
    }
    Ok(response_builder.body(Body::from(response.body.bytes()))?)
}

fn json_response(status: u16, document: &serde_json::Value) -> Response<Body> {
    let mut response = Response::new(Body::from(document.to_string()));
    *response.status_mut() = hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(message: &str) -> Response<Body> {
    json_response(500, &json!({ "error": message }))
}

fn is_preflight(request: &Request<Body>) -> bool {
    request.method() == Method::OPTIONS && request.headers().contains_key("access-control-request-method")
}

fn preflight_response(request: &Request<Body>) -> Result<Response<Body>> {
    let allow_headers = request
        .headers()
        .get("access-control-request-headers")
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    Ok(Response::builder()
        .status(204)
        .header("access-control-allow-methods", "GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS")
        .header("access-control-allow-headers", allow_headers)
        .body(Body::empty())?)
}
