//! Consumer-driven contract testing.
//!
//! A consumer test describes the interactions it expects with
//! [`PactBuilder`], exercises its client against a [`MockServer`] and, when
//! every request matched, writes a pact file. The provider side loads that
//! pact and replays it with [`verify_provider`].
//!
//! ```no_run
//! use covenant::{
//!     matchers, ContractTest, InteractionBuilder, MockServerConfig, PactBuilder, RequestBuilder,
//!     ResponseBuilder,
//! };
//! use serde_json::json;
//!
//! let pact = PactBuilder::new("ShapeClient", "ShapeService")
//!     .interaction(
//!         InteractionBuilder::new("a request for the area of a square")
//!             .request(RequestBuilder::new().post().path("/area").json_body(json!({
//!                 "length": matchers::number(3),
//!                 "width": matchers::number(3),
//!             })))
//!             .response(ResponseBuilder::new().json_body(json!({ "value": matchers::number(9) }))),
//!     )
//!     .build()?;
//!
//! ContractTest::new(pact, MockServerConfig::from_env()?).run(|mock| {
//!     // point the client under test at mock.url()
//! })?;
//! # Ok::<(), covenant::Error>(())
//! ```

pub mod builder;
pub mod content;
pub mod content_type;
mod error;
pub mod generators;
pub mod logging;
pub mod matching;
pub mod mock;
pub mod model;
pub mod path;
pub mod persistence;
pub mod report;
mod session;
mod util;
pub mod verifier;

pub use builder::{matchers, InteractionBuilder, MessageBuilder, PactBuilder, RequestBuilder, ResponseBuilder};
pub use content::{ContentHandler, HandlerRegistry};
pub use content_type::ContentType;
pub use covenant_codegen::contract_test;
pub use error::{Error, Result};
pub use matching::{matches, MatchResult, MatchingConfig, Mismatch, MismatchKind};
pub use mock::{MockServer, MockServerConfig};
pub use model::{Body, HttpRequest, HttpResponse, Interaction, Message, Pact, PactSpecVersion, ProviderState};
pub use path::DocPath;
pub use persistence::WriteMode;
pub use report::{Failure, VerificationReport};
pub use session::ContractTest;
pub use verifier::{verify_provider, verify_provider_blocking, ProviderInfo, VerificationOptions};
