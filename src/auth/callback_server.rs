//! Loopback HTTP server that receives the SSO redirect.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::AuthError;

type Pending = HashMap<String, oneshot::Sender<String>>;

/// Logins waiting for their callback, keyed by OAuth `state`.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    pending: Arc<Mutex<Pending>>,
}

impl CallbackRegistry {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `state` and get a handle that resolves with its code.
    pub fn expect(&self, state: &str) -> PendingLogin {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(state.to_string(), tx);
        PendingLogin {
            state: state.to_string(),
            registry: self.clone(),
            rx,
        }
    }

    pub fn remove(&self, state: &str) {
        self.lock().remove(state);
    }

    pub fn is_pending(&self, state: &str) -> bool {
        self.lock().contains_key(state)
    }

    /// Hand `code` to the login waiting on `state`. `false` if nobody is.
    fn deliver(&self, state: &str, code: String) -> bool {
        match self.lock().remove(state) {
            Some(tx) => tx.send(code).is_ok(),
            None => false,
        }
    }
}

/// A registered login. Dropping it unregisters the state.
pub struct PendingLogin {
    state: String,
    registry: CallbackRegistry,
    rx: oneshot::Receiver<String>,
}

impl PendingLogin {
    pub fn state(&self) -> &str {
        &self.state
    }

    pub async fn wait(mut self, timeout: Duration) -> Result<String, AuthError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(_)) => Err(AuthError::Cancelled),
            Err(_) => {
                log::warn!("[PendingLogin::wait] No callback for state {} within {:?}", self.state, timeout);
                Err(AuthError::Timeout(timeout))
            }
        }
    }
}

impl Drop for PendingLogin {
    fn drop(&mut self) {
        self.registry.remove(&self.state);
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

async fn callback_handler(
    State(registry): State<CallbackRegistry>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, &'static str) {
    if query.code.is_empty() {
        log::warn!("[callback_handler] Callback without code");
        return (StatusCode::BAD_REQUEST, "error");
    }
    if !registry.deliver(&query.state, query.code) {
        log::warn!("[callback_handler] Callback for unknown state {}", query.state);
        return (StatusCode::BAD_REQUEST, "error");
    }
    log::info!("[callback_handler] Login callback received");
    (StatusCode::OK, "ok")
}

pub fn router(registry: CallbackRegistry, path: &str) -> Router {
    Router::new()
        .route(path, get(callback_handler))
        .with_state(registry)
}

/// The running server. Call `shutdown` to stop it.
pub struct CallbackServer {
    registry: CallbackRegistry,
    local_addr: SocketAddr,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl CallbackServer {
    pub async fn start(hostport: &str, path: &str) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(hostport).await?;
        let local_addr = listener.local_addr()?;
        let registry = CallbackRegistry::default();
        let app = router(registry.clone(), path);
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = result {
                log::error!("[CallbackServer] Server stopped with error: {}", e);
            }
        });

        log::info!("[CallbackServer::start] Listening on {}{}", local_addr, path);
        Ok(Self {
            registry,
            local_addr,
            shutdown: Mutex::new(Some(tx)),
        })
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&self) {
        let tx = self
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(());
            log::info!("[CallbackServer::shutdown] Stopped callback server");
        }
    }
}
