//! Whole-window redirect variant of the handshake
//!
//! For hosts that cannot open a popup: the top-level window navigates to the
//! provider and comes back to the app. There is no message channel; the page
//! the provider redirects to validates the return URL's query parameters
//! directly. The state discipline is identical to the popup flow, and the
//! single-use slot is cleared as soon as the one check has happened.

use crate::callback::{parse_callback_params, GENERIC_OAUTH_ERROR, STATE_MISMATCH_ERROR};
use crate::orchestrator::build_authorize_url;
use crate::state::{generate_state, StateTokenStore};
use ab_config::ProviderDescriptor;
use ab_types::AppResult;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of completing a redirect-flow attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// Validated authorization response; the host proceeds to the exchange
    /// or its authenticated entry point.
    Authorized { code: String, state: String },
    /// Terminal failure, same precedence as the popup flow.
    Denied { message: String },
}

/// Redirect-flow coordinator for one provider
pub struct RedirectFlow {
    descriptor: ProviderDescriptor,
    store: Arc<dyn StateTokenStore>,
}

impl RedirectFlow {
    pub fn new(descriptor: ProviderDescriptor, store: Arc<dyn StateTokenStore>) -> Self {
        Self { descriptor, store }
    }

    /// Start an attempt: generate and save a fresh state token, and return
    /// the authorize URL the host should navigate the whole window to.
    pub fn begin(&self) -> AppResult<String> {
        let state = generate_state()?;
        self.store.save(&state);
        info!(
            "Redirect flow started for provider {}",
            self.descriptor.provider
        );
        Ok(build_authorize_url(&self.descriptor, &state))
    }

    /// Complete an attempt from the URL the provider redirected back to.
    ///
    /// Validates the query (and fragment, if any) directly; the outcome is a
    /// navigation decision for the host rather than a relayed message. The
    /// state slot is cleared unconditionally; the token is single-use.
    pub fn complete(&self, return_url: &str) -> RedirectOutcome {
        let (rest, fragment) = match return_url.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (return_url, None),
        };
        let query = rest.split_once('?').map(|(_, query)| query);

        let params = parse_callback_params(query, fragment);
        if params.is_empty() {
            warn!("Redirect return carried no parameters at all");
            self.store.clear();
            return RedirectOutcome::Denied {
                message: GENERIC_OAUTH_ERROR.to_string(),
            };
        }

        let state = params.get("state").cloned();
        let state_ok = state
            .as_deref()
            .is_some_and(|state| self.store.check(state));
        self.store.clear();

        if let Some(error) = params.get("error") {
            warn!("Provider returned an error on redirect: {}", error);
            return RedirectOutcome::Denied {
                message: error.clone(),
            };
        }

        if !state_ok {
            warn!("Redirect return state does not match the stored token");
            return RedirectOutcome::Denied {
                message: STATE_MISMATCH_ERROR.to_string(),
            };
        }

        match (params.get("code"), state) {
            (Some(code), Some(state)) => RedirectOutcome::Authorized {
                code: code.clone(),
                state,
            },
            _ => RedirectOutcome::Denied {
                message: GENERIC_OAUTH_ERROR.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SessionStateStore, SessionStore};
    use ab_config::Provider;
    use std::collections::BTreeMap;

    fn flow() -> (RedirectFlow, Arc<SessionStateStore>) {
        let store = Arc::new(SessionStateStore::new(Arc::new(SessionStore::new())));
        let descriptor = ProviderDescriptor {
            provider: Provider::Oidc,
            authorize_url: "https://idp/auth".to_string(),
            client_id: "abc".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            scope: "openid".to_string(),
            response_type: "code".to_string(),
            exchange_url: None,
            extra_auth_params: BTreeMap::new(),
        };
        (RedirectFlow::new(descriptor, store.clone()), store)
    }

    #[test]
    fn test_begin_saves_state_and_builds_url() {
        let (flow, store) = flow();
        let url = flow.begin().unwrap();
        let state = store.get().expect("state saved");
        assert!(url.starts_with("https://idp/auth?response_type=code"));
        assert!(url.ends_with(&format!("&state={}", state)));
    }

    #[test]
    fn test_complete_success_clears_state() {
        let (flow, store) = flow();
        flow.begin().unwrap();
        let state = store.get().unwrap();

        let outcome = flow.complete(&format!("https://app/cb?code=XYZ&state={}", state));
        assert_eq!(
            outcome,
            RedirectOutcome::Authorized {
                code: "XYZ".to_string(),
                state
            }
        );
        assert!(store.get().is_none());
    }

    #[test]
    fn test_complete_state_mismatch() {
        let (flow, store) = flow();
        flow.begin().unwrap();

        let outcome = flow.complete("https://app/cb?code=XYZ&state=FORGED");
        assert_eq!(
            outcome,
            RedirectOutcome::Denied {
                message: STATE_MISMATCH_ERROR.to_string()
            }
        );
        assert!(store.get().is_none());
    }

    #[test]
    fn test_complete_provider_error_wins() {
        let (flow, _store) = flow();
        flow.begin().unwrap();

        let outcome = flow.complete("https://app/cb?error=access_denied&state=FORGED");
        assert_eq!(
            outcome,
            RedirectOutcome::Denied {
                message: "access_denied".to_string()
            }
        );
    }

    #[test]
    fn test_complete_fragment_response() {
        let (flow, store) = flow();
        flow.begin().unwrap();
        let state = store.get().unwrap();

        let outcome = flow.complete(&format!("https://app/cb#code=XYZ&state={}", state));
        assert!(matches!(outcome, RedirectOutcome::Authorized { .. }));
    }

    #[test]
    fn test_complete_empty_return_is_generic_error() {
        let (flow, _store) = flow();
        flow.begin().unwrap();

        let outcome = flow.complete("https://app/cb");
        assert_eq!(
            outcome,
            RedirectOutcome::Denied {
                message: GENERIC_OAUTH_ERROR.to_string()
            }
        );
    }

    #[test]
    fn test_state_is_single_use() {
        let (flow, store) = flow();
        flow.begin().unwrap();
        let state = store.get().unwrap();
        let url = format!("https://app/cb?code=XYZ&state={}", state);

        assert!(matches!(
            flow.complete(&url),
            RedirectOutcome::Authorized { .. }
        ));
        // Replaying the same return URL fails; the token was consumed
        assert!(matches!(
            flow.complete(&url),
            RedirectOutcome::Denied { .. }
        ));
    }
}
