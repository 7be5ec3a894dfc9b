//! Popup-based OAuth2/OIDC authorization-code handshake
//!
//! This crate lets a host application obtain an authorization code (or a
//! backend-exchanged token) from a third-party identity provider without the
//! provider page ever replacing the host. The provider opens in a popup
//! browser window; a loopback callback server receives the redirect and
//! relays the result to the waiting orchestrator over a narrow, validated
//! message channel.
//!
//! # Features
//! - CSRF protection with a single-use state token
//! - Popup window lifecycle control with closed-window polling
//! - Tagged cross-context message protocol with strict validation
//! - Optional code-for-token exchange against the backend token endpoint
//! - Whole-window redirect variant for hosts that cannot open popups
//!
//! # Usage Example
//! ```no_run
//! # async fn run(descriptor: ab_config::ProviderDescriptor) -> ab_types::AppResult<()> {
//! use ab_oauth::{
//!     AuthOrchestrator, BrowserPopupDriver, CallbackServer, OpenerMetrics, SessionStore,
//!     SessionStateStore,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(SessionStateStore::new(Arc::new(SessionStore::new())));
//! let server = Arc::new(CallbackServer::start(4700, store.clone()).await?);
//! let orchestrator = AuthOrchestrator::new(
//!     descriptor,
//!     store,
//!     Arc::new(BrowserPopupDriver::chromium("chromium")),
//!     server,
//!     OpenerMetrics::default(),
//! );
//! orchestrator.start()?;
//! let mut status = orchestrator.subscribe();
//! // render status updates until a terminal state arrives
//! # Ok(())
//! # }
//! ```

mod callback;
mod exchange;
mod login;
mod orchestrator;
mod popup;
mod redirect;
mod relay;
mod server;
mod state;

pub use callback::{
    parse_callback_params, CallbackPayload, CallbackReceiver, GENERIC_OAUTH_ERROR,
    STATE_MISMATCH_ERROR,
};
pub use exchange::{AuthTokenPayload, TokenExchanger};
pub use login::{LoginClient, LoginOutcome, AUTHENTICATED_ENTRY};
pub use orchestrator::{
    build_authorize_url, AttemptId, AuthOrchestrator, AuthStatus, CANCELLED_ERROR,
    POPUP_BLOCKED_ERROR,
};
pub use popup::{
    BrowserPopupDriver, OpenerMetrics, PopupDriver, PopupGeometry, PopupWindow,
    CLOSE_POLL_INTERVAL, POPUP_HEIGHT, POPUP_WIDTH,
};
pub use redirect::{RedirectFlow, RedirectOutcome};
pub use relay::{relay_channel, RelayDecode, RelayMessage, RelayPayload, RelaySender, OAUTH_RESPONSE};
pub use server::CallbackServer;
pub use state::{
    generate_state, SessionStateStore, SessionStore, StateTokenStore, STATE_LENGTH,
    STATE_STORAGE_KEY,
};
