//! Loopback HTTP server hosting the OAuth callback route
//!
//! The popup lands here after the provider redirects back. The route runs
//! the callback receiver and posts the resulting relay message to the
//! registered opener. At most one opener is registered at a time; starting a
//! new attempt replaces the previous registration.

use crate::callback::CallbackReceiver;
use crate::relay::RelaySender;
use crate::state::StateTokenStore;
use ab_types::{AppError, AppResult};
use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Neutral page shown in the popup while the result is relayed
const COMPLETE_PAGE: &str = r#"<html>
    <head><title>Signing in</title></head>
    <body style="font-family: sans-serif; text-align: center; padding: 50px;">
        <p>Loading...</p>
        <p>You can close this window.</p>
        <script>setTimeout(function() { window.close(); }, 1500);</script>
    </body>
</html>"#;

/// Page served when the response may live in the URL fragment; the fragment
/// never reaches the server, so the page re-submits it as a query string
const FRAGMENT_FORWARD_PAGE: &str = r#"<html>
    <head><title>Signing in</title></head>
    <body style="font-family: sans-serif; text-align: center; padding: 50px;">
        <p>Loading...</p>
        <script>
            var fragment = window.location.hash.replace(/^#/, '');
            if (fragment) {
                window.location.replace('/callback?' + fragment);
            } else {
                window.location.replace('/callback/empty');
            }
        </script>
    </body>
</html>"#;

const NO_OPENER_PAGE: &str = r#"<html>
    <head><title>Sign-in failed</title></head>
    <body style="font-family: sans-serif; text-align: center; padding: 50px;">
        <p>This page must be opened from the application's sign-in screen.</p>
    </body>
</html>"#;

#[derive(Clone)]
struct ServerState {
    opener: Arc<Mutex<Option<RelaySender>>>,
    receiver: CallbackReceiver,
}

/// Callback server for one host application
pub struct CallbackServer {
    opener: Arc<Mutex<Option<RelaySender>>>,
    local_addr: SocketAddr,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl CallbackServer {
    /// Bind `127.0.0.1:port` and start serving the callback route.
    ///
    /// Port 0 picks a free port; see [`CallbackServer::local_addr`].
    pub async fn start(port: u16, store: Arc<dyn StateTokenStore>) -> AppResult<Self> {
        let opener = Arc::new(Mutex::new(None));
        let state = ServerState {
            opener: Arc::clone(&opener),
            receiver: CallbackReceiver::new(store),
        };

        let app = Router::new()
            .route("/callback", get(callback_handler))
            .route("/callback/empty", get(empty_callback_handler))
            .with_state(state);

        let addr = format!("127.0.0.1:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            AppError::OAuth(format!(
                "Failed to bind callback server on port {}: {}",
                port, e
            ))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AppError::OAuth(format!("Failed to read callback server address: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                error!("OAuth callback server error: {}", e);
            }
        });

        info!("OAuth callback server listening on http://{}/callback", local_addr);

        Ok(Self {
            opener,
            local_addr,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        })
    }

    /// Address the server actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register the opener for the current attempt, replacing any previous
    /// registration. A listener never outlives its attempt.
    pub fn register_opener(&self, sender: RelaySender) {
        *self.opener.lock() = Some(sender);
    }

    /// Drop the current registration. Idempotent.
    pub fn unregister_opener(&self) {
        *self.opener.lock() = None;
    }

    pub fn has_opener(&self) -> bool {
        self.opener.lock().is_some()
    }

    #[cfg(test)]
    pub(crate) fn opener_sender(&self) -> Option<RelaySender> {
        self.opener.lock().clone()
    }

    /// Stop accepting callbacks. Idempotent.
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn callback_handler(
    State(state): State<ServerState>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let query = query.unwrap_or_default();
    if query.is_empty() {
        // The response may be in the fragment, which only the page can see.
        return (StatusCode::OK, Html(FRAGMENT_FORWARD_PAGE)).into_response();
    }

    relay_to_opener(&state, Some(&query))
}

async fn empty_callback_handler(State(state): State<ServerState>) -> axum::response::Response {
    // The page found neither query nor fragment; still a terminal message,
    // never a silent hang.
    relay_to_opener(&state, None)
}

fn relay_to_opener(state: &ServerState, query: Option<&str>) -> axum::response::Response {
    let opener = state.opener.lock();
    let Some(sender) = opener.as_ref() else {
        // Not opened from an attempt; there is no valid recipient. Fatal.
        warn!("Callback arrived with no registered opener");
        return (StatusCode::BAD_REQUEST, Html(NO_OPENER_PAGE)).into_response();
    };

    let message = state.receiver.receive(query, None);
    info!("Relaying callback result to opener");
    sender.post(&message);

    (StatusCode::OK, Html(COMPLETE_PAGE)).into_response()
}
