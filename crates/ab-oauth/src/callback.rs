//! Callback receiver
//!
//! Runs on the callback route once the provider redirects the popup back.
//! It folds the query string and URL fragment into one parameter map,
//! validates the received state against the shared store, and builds the
//! relay message for the opener. The receiver only ever reads the state
//! slot; clearing it belongs to the attempt owner.

use crate::relay::RelayMessage;
use crate::state::StateTokenStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Error reported when the state echoed by the provider does not match ours
pub const STATE_MISMATCH_ERROR: &str = "OAuth error: State mismatch.";

/// Error reported when the provider sent nothing usable
pub const GENERIC_OAUTH_ERROR: &str = "OAuth error: An error has occurred.";

/// Parameters extracted from the popup's final URL
///
/// Constructed once here, consumed once by the relay channel, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackPayload {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackPayload {
    fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            code: params.get("code").cloned(),
            state: params.get("state").cloned(),
            error: params.get("error").cloned(),
        }
    }
}

/// Merge the URL query string and fragment into one parameter map.
///
/// Providers differ in where they put the response. Precedence is fixed: the
/// query-string value wins, and a fragment value is used only for keys the
/// query did not provide (the code-flow response is defined on the query
/// string; fragments appear only for implicit-style providers).
pub fn parse_callback_params(
    query: Option<&str>,
    fragment: Option<&str>,
) -> HashMap<String, String> {
    let mut params = parse_urlencoded(query.unwrap_or(""));
    for (key, value) in parse_urlencoded(fragment.unwrap_or("")) {
        params.entry(key).or_insert(value);
    }
    params
}

fn parse_urlencoded(input: &str) -> HashMap<String, String> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    // '+' means space in query strings; percent-decode the rest, falling
    // back to the raw text on invalid sequences rather than dropping data.
    let plus_decoded = raw.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_decoded,
    }
}

/// Validates callback parameters and produces the relay message
#[derive(Clone)]
pub struct CallbackReceiver {
    store: Arc<dyn StateTokenStore>,
}

impl CallbackReceiver {
    pub fn new(store: Arc<dyn StateTokenStore>) -> Self {
        Self { store }
    }

    /// Turn the popup's final URL parts into the message for the opener.
    ///
    /// Error precedence: explicit provider `error` beats state validation,
    /// a state mismatch beats the generic unknown error. An empty response
    /// is a terminal generic error, never a silent hang.
    pub fn receive(&self, query: Option<&str>, fragment: Option<&str>) -> RelayMessage {
        let params = parse_callback_params(query, fragment);
        if params.is_empty() {
            warn!("Callback carried no parameters at all");
            return RelayMessage::error(GENERIC_OAUTH_ERROR);
        }

        let payload = CallbackPayload::from_params(&params);
        let state_ok = payload
            .state
            .as_deref()
            .is_some_and(|state| self.store.check(state));

        if let Some(error) = payload.error {
            debug!("Provider returned an error response: {}", error);
            return RelayMessage::error(error);
        }

        if !state_ok {
            warn!("Callback state does not match the stored token");
            return RelayMessage::error(STATE_MISMATCH_ERROR);
        }

        match (payload.code, payload.state) {
            (Some(code), Some(state)) => RelayMessage::success(code, state),
            _ => {
                warn!("State-valid callback carried no authorization code");
                RelayMessage::error(GENERIC_OAUTH_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SessionStateStore, SessionStore, StateTokenStore};

    fn receiver_with_state(state: &str) -> CallbackReceiver {
        let store = Arc::new(SessionStateStore::new(Arc::new(SessionStore::new())));
        store.save(state);
        CallbackReceiver::new(store)
    }

    #[test]
    fn test_parse_merges_query_and_fragment() {
        let params = parse_callback_params(Some("code=abc&state=S1"), Some("extra=1"));
        assert_eq!(params.get("code").unwrap(), "abc");
        assert_eq!(params.get("state").unwrap(), "S1");
        assert_eq!(params.get("extra").unwrap(), "1");
    }

    #[test]
    fn test_parse_query_wins_over_fragment() {
        let params = parse_callback_params(Some("state=query"), Some("state=fragment&code=c"));
        assert_eq!(params.get("state").unwrap(), "query");
        assert_eq!(params.get("code").unwrap(), "c");
    }

    #[test]
    fn test_parse_decodes_components() {
        let params = parse_callback_params(Some("error=access_denied&msg=user+said%20no"), None);
        assert_eq!(params.get("error").unwrap(), "access_denied");
        assert_eq!(params.get("msg").unwrap(), "user said no");
    }

    #[test]
    fn test_receive_success() {
        let receiver = receiver_with_state("S1");
        let message = receiver.receive(Some("code=XYZ&state=S1"), None);
        assert_eq!(message, RelayMessage::success("XYZ", "S1"));
    }

    #[test]
    fn test_receive_fragment_only_response() {
        let receiver = receiver_with_state("S1");
        let message = receiver.receive(None, Some("code=XYZ&state=S1"));
        assert_eq!(message, RelayMessage::success("XYZ", "S1"));
    }

    #[test]
    fn test_receive_state_mismatch() {
        let receiver = receiver_with_state("S2");
        let message = receiver.receive(Some("code=XYZ&state=S1"), None);
        assert_eq!(message, RelayMessage::error(STATE_MISMATCH_ERROR));
    }

    #[test]
    fn test_receive_provider_error_beats_state_validation() {
        // Even with a mismatched state, the provider's own error is what
        // the user should see.
        let receiver = receiver_with_state("S2");
        let message = receiver.receive(Some("error=access_denied&state=S1"), None);
        assert_eq!(message, RelayMessage::error("access_denied"));
    }

    #[test]
    fn test_receive_provider_error_decoded() {
        let receiver = receiver_with_state("S1");
        let message = receiver.receive(Some("error=consent%20required&state=S1"), None);
        assert_eq!(message, RelayMessage::error("consent required"));
    }

    #[test]
    fn test_receive_empty_response_is_generic_error() {
        let receiver = receiver_with_state("S1");
        let message = receiver.receive(None, None);
        assert_eq!(message, RelayMessage::error(GENERIC_OAUTH_ERROR));
        let message = receiver.receive(Some(""), Some(""));
        assert_eq!(message, RelayMessage::error(GENERIC_OAUTH_ERROR));
    }

    #[test]
    fn test_receive_missing_code_is_generic_error() {
        let receiver = receiver_with_state("S1");
        let message = receiver.receive(Some("state=S1"), None);
        assert_eq!(message, RelayMessage::error(GENERIC_OAUTH_ERROR));
    }

    #[test]
    fn test_receiver_does_not_clear_the_store() {
        let store = Arc::new(SessionStateStore::new(Arc::new(SessionStore::new())));
        store.save("S1");
        let receiver = CallbackReceiver::new(store.clone());
        receiver.receive(Some("code=XYZ&state=S1"), None);
        assert!(store.check("S1"));
    }
}
