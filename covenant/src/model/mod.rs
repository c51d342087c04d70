//! Typed representation of pacts, interactions, rules and bodies.

pub mod body;
pub mod interaction;
pub mod matching_rules;
pub mod pact;
pub mod provider_state;

pub use body::Body;
pub use interaction::{
    HttpRequest, HttpResponse, Interaction, InteractionContents, Message, MultiValueMap,
};
pub use matching_rules::{HttpStatus, MatchingRule, MatchingRules, RuleCategory, RuleList, RuleLogic};
pub use pact::{Pact, PactSpecVersion, Participant};
pub use provider_state::ProviderState;
