//! Authorization orchestrator
//!
//! Ties the state store, popup controller, callback server and relay channel
//! into one observable state machine: `idle → pending → success | error`.
//! One attempt is active at a time; starting a new one tears the previous
//! attempt down first, and every terminal transition runs the same
//! idempotent cleanup (close popup, clear state, drop listener, stop poll).

use crate::callback::STATE_MISMATCH_ERROR;
use crate::exchange::{AuthTokenPayload, TokenExchanger};
use crate::popup::{OpenerMetrics, PopupDriver, PopupGeometry, PopupWindow, CLOSE_POLL_INTERVAL};
use crate::relay::{relay_channel, RelayDecode, RelayMessage};
use crate::server::CallbackServer;
use crate::state::{generate_state, StateTokenStore};
use ab_config::ProviderDescriptor;
use ab_types::AppResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error surfaced when the popup closes before any response arrives
pub const CANCELLED_ERROR: &str = "Authentication was not completed";

/// Error surfaced when the environment refuses to open the popup
pub const POPUP_BLOCKED_ERROR: &str = "Popup window was blocked; allow popups and try again";

/// Unique identifier for an authorization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable status of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// No attempt has started yet
    Idle,
    /// Waiting for the user to finish with the provider
    Pending,
    /// Terminal: the handshake completed
    Success {
        /// Authorization code returned by the provider
        code: String,
        /// Token payload from the backend exchange, when one was configured
        /// and the backend returned a body
        token: Option<AuthTokenPayload>,
    },
    /// Terminal: the handshake failed, with a human-readable message
    Error { message: String },
}

impl AuthStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, AuthStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthStatus::Success { .. } | AuthStatus::Error { .. })
    }
}

/// Build the provider authorize URL for one attempt.
///
/// Parameter order and encoding are part of the contract with the backend
/// and providers: `response_type`, `client_id`, `redirect_uri`, `scope`,
/// `state`, then any provider-specific extras.
pub fn build_authorize_url(descriptor: &ProviderDescriptor, state: &str) -> String {
    let mut url = format!(
        "{}?response_type={}&client_id={}&redirect_uri={}&scope={}&state={}",
        descriptor.authorize_url,
        urlencoding::encode(&descriptor.response_type),
        urlencoding::encode(&descriptor.client_id),
        urlencoding::encode(&descriptor.redirect_uri),
        urlencoding::encode(&descriptor.scope),
        urlencoding::encode(state),
    );

    for (key, value) in &descriptor.extra_auth_params {
        url.push_str(&format!(
            "&{}={}",
            urlencoding::encode(key),
            urlencoding::encode(value)
        ));
    }

    url
}

/// One in-flight handshake; owned by the orchestrator that created it
struct ActiveAttempt {
    id: AttemptId,
    popup: Mutex<Option<Box<dyn PopupWindow>>>,
    cleaned: AtomicBool,
    started_at: DateTime<Utc>,
}

struct AttemptSlot {
    attempt: Arc<ActiveAttempt>,
    task: Option<JoinHandle<()>>,
}

/// Per-provider coordinator for the popup handshake
pub struct AuthOrchestrator {
    descriptor: ProviderDescriptor,
    store: Arc<dyn StateTokenStore>,
    popup_driver: Arc<dyn PopupDriver>,
    server: Arc<CallbackServer>,
    exchanger: Arc<TokenExchanger>,
    opener: OpenerMetrics,
    status_tx: watch::Sender<AuthStatus>,
    // Keeps the channel from ever being receiver-less, so `send` always
    // stores the value even before anyone calls `subscribe`.
    _status_rx: watch::Receiver<AuthStatus>,
    attempt: Mutex<Option<AttemptSlot>>,
}

impl AuthOrchestrator {
    /// Create an orchestrator for one provider descriptor.
    ///
    /// All collaborators are injected; the configuration value is immutable
    /// and read-only from here on.
    pub fn new(
        descriptor: ProviderDescriptor,
        store: Arc<dyn StateTokenStore>,
        popup_driver: Arc<dyn PopupDriver>,
        server: Arc<CallbackServer>,
        opener: OpenerMetrics,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(AuthStatus::Idle);
        Self {
            descriptor,
            store,
            popup_driver,
            server,
            exchanger: Arc::new(TokenExchanger::new()),
            opener,
            status_tx,
            _status_rx: status_rx,
            attempt: Mutex::new(None),
        }
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> AuthStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to status transitions; what the login UI renders.
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status_tx.subscribe()
    }

    /// Begin a new authorization attempt: `idle → pending`.
    ///
    /// Any unfinished previous attempt is torn down first so two attempts
    /// can never race on the shared state-token slot. Must be called inside
    /// a tokio runtime.
    pub fn start(&self) -> AppResult<()> {
        self.supersede_previous();

        let state_token = generate_state()?;
        self.store.save(&state_token);
        let auth_url = build_authorize_url(&self.descriptor, &state_token);

        let (sender, rx) = relay_channel();
        self.server.register_opener(sender);

        let attempt = Arc::new(ActiveAttempt {
            id: AttemptId::new(),
            popup: Mutex::new(None),
            cleaned: AtomicBool::new(false),
            started_at: Utc::now(),
        });

        let geometry = PopupGeometry::centered_on(&self.opener);
        match self.popup_driver.open(&auth_url, &geometry) {
            Ok(popup) => {
                *attempt.popup.lock() = Some(popup);
            }
            Err(e) => {
                warn!("Popup blocked for attempt {}: {}", attempt.id, e);
                Self::cleanup(&attempt, &self.store, &self.server);
                let _ = self.status_tx.send(AuthStatus::Error {
                    message: POPUP_BLOCKED_ERROR.to_string(),
                });
                return Ok(());
            }
        }

        info!(
            "Authorization attempt {} started for provider {}",
            attempt.id, self.descriptor.provider
        );
        let _ = self.status_tx.send(AuthStatus::Pending);

        let task = tokio::spawn(Self::run_attempt(
            Arc::clone(&attempt),
            rx,
            self.descriptor.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.server),
            Arc::clone(&self.exchanger),
            self.status_tx.clone(),
        ));

        *self.attempt.lock() = Some(AttemptSlot {
            attempt,
            task: Some(task),
        });

        Ok(())
    }

    fn supersede_previous(&self) {
        if let Some(mut slot) = self.attempt.lock().take() {
            debug!("Superseding unfinished attempt {}", slot.attempt.id);
            Self::cleanup(&slot.attempt, &self.store, &self.server);
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }
    }

    /// Release everything an attempt holds. Runs at most once per attempt;
    /// later calls are no-ops, so any terminal path may invoke it.
    fn cleanup(
        attempt: &ActiveAttempt,
        store: &Arc<dyn StateTokenStore>,
        server: &Arc<CallbackServer>,
    ) {
        if attempt.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut popup) = attempt.popup.lock().take() {
            popup.close();
        }
        store.clear();
        server.unregister_opener();
        debug!("Attempt {} cleaned up", attempt.id);
    }

    /// Drive one attempt to a terminal state.
    ///
    /// Waits on the relay channel and, every [`CLOSE_POLL_INTERVAL`], on the
    /// popup's closed flag; whichever fires a terminal condition first wins.
    async fn run_attempt(
        attempt: Arc<ActiveAttempt>,
        mut rx: mpsc::UnboundedReceiver<serde_json::Value>,
        descriptor: ProviderDescriptor,
        store: Arc<dyn StateTokenStore>,
        server: Arc<CallbackServer>,
        exchanger: Arc<TokenExchanger>,
        status_tx: watch::Sender<AuthStatus>,
    ) {
        let mut poll = tokio::time::interval(CLOSE_POLL_INTERVAL);

        let message = loop {
            tokio::select! {
                value = rx.recv() => match value {
                    Some(value) => match RelayMessage::decode(&value) {
                        RelayDecode::Message(message) => break message,
                        // Unrelated traffic and malformed messages are not
                        // for the user; keep waiting.
                        RelayDecode::Unrelated => {
                            debug!("Ignoring unrelated message on relay channel");
                        }
                        RelayDecode::Malformed => {
                            warn!("Ignoring malformed relay message");
                        }
                    },
                    // Channel torn down underneath us (superseded/shutdown)
                    None => break RelayMessage::error(CANCELLED_ERROR),
                },
                _ = poll.tick() => {
                    let closed = attempt
                        .popup
                        .lock()
                        .as_mut()
                        .map(|popup| popup.is_closed())
                        .unwrap_or(true);
                    if closed {
                        info!(
                            "Popup for attempt {} closed before a response arrived",
                            attempt.id
                        );
                        break RelayMessage::error(CANCELLED_ERROR);
                    }
                }
            }
        };

        let status = Self::resolve_outcome(message, &descriptor, &store, &exchanger).await;

        Self::cleanup(&attempt, &store, &server);
        let elapsed_ms = (Utc::now() - attempt.started_at).num_milliseconds();
        match &status {
            AuthStatus::Success { .. } => {
                info!("Attempt {} succeeded after {}ms", attempt.id, elapsed_ms)
            }
            AuthStatus::Error { message } => {
                warn!("Attempt {} failed after {}ms: {}", attempt.id, elapsed_ms, message)
            }
            _ => {}
        }
        let _ = status_tx.send(status);
    }

    /// Turn a terminal relay message into the final status.
    ///
    /// The channel is untrusted, so the state is re-validated here against
    /// the stored token even though the callback side already checked it.
    async fn resolve_outcome(
        message: RelayMessage,
        descriptor: &ProviderDescriptor,
        store: &Arc<dyn StateTokenStore>,
        exchanger: &Arc<TokenExchanger>,
    ) -> AuthStatus {
        match message {
            RelayMessage::Error { error } => AuthStatus::Error { message: error },
            RelayMessage::Success { payload } => {
                if !store.check(&payload.state) {
                    return AuthStatus::Error {
                        message: STATE_MISMATCH_ERROR.to_string(),
                    };
                }
                if descriptor.exchange_url.is_none() {
                    return AuthStatus::Success {
                        code: payload.code,
                        token: None,
                    };
                }
                match exchanger
                    .exchange_code(descriptor, &payload.code, &payload.state)
                    .await
                {
                    Ok(token) => AuthStatus::Success {
                        code: payload.code,
                        token,
                    },
                    Err(e) => AuthStatus::Error {
                        message: e.to_string(),
                    },
                }
            }
        }
    }
}

impl Drop for AuthOrchestrator {
    fn drop(&mut self) {
        self.supersede_previous();
    }
}
