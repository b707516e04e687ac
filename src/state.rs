use crate::auth::callback_server::CallbackServer;
use crate::auth::SsoClient;
use crate::config::AppConfig;
use crate::db::Db;
use crate::errors::PublicError;
use crate::esi::EsiClient;
use crate::keychain;
use crate::refresh::Syncer;

/// Long-lived services shared by every command.
pub struct AppState {
    pub config: AppConfig,
    pub esi: EsiClient,
    pub sso: SsoClient,
    pub callbacks: CallbackServer,
}

impl AppState {
    /// Build the HTTP clients and start the SSO callback server.
    pub async fn start(config: AppConfig) -> Result<Self, PublicError> {
        let http = EsiClient::http_client()
            .map_err(|e| PublicError::new("Could not create HTTP client").with_cause(e))?;
        let callbacks = CallbackServer::start(
            &config.serving.hostport,
            &config.serving.callback_path,
        )
        .await
        .map_err(|e| {
            PublicError::new(format!(
                "Could not listen for EVE Online logins on {}",
                config.serving.hostport
            ))
            .with_cause(e)
        })?;

        Ok(Self {
            esi: EsiClient::new(http.clone()),
            sso: SsoClient::new(http, &config),
            callbacks,
            config,
        })
    }

    /// A syncer wired to ESI, the SSO and the keychain.
    pub fn syncer<'a>(&'a self, db: &'a Db) -> Syncer<'a> {
        Syncer {
            api: &self.esi,
            tokens: &self.sso,
            db,
            seal: keychain::seal_refresh_token,
            unseal: keychain::unseal_refresh_token,
            timeout: self.config.refresh_timeout(),
        }
    }

    pub fn shutdown(&self) {
        self.callbacks.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;
    use std::time::Duration;

    fn local_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.serving.hostport = "127.0.0.1:0".to_string();
        config.esi.refresh_timeout_secs = 7;
        config
    }

    #[tokio::test]
    async fn test_start_binds_callback_server() {
        let state = AppState::start(local_config()).await.unwrap();
        assert_ne!(state.callbacks.local_addr().port(), 0);
        assert_eq!(state.sso.client_id(), state.config.esi.client_id);
        state.shutdown();
        state.shutdown();
    }

    #[tokio::test]
    async fn test_syncer_uses_refresh_timeout() {
        let state = AppState::start(local_config()).await.unwrap();
        let db = Db::new(create_test_db());
        let syncer = state.syncer(&db);
        assert_eq!(syncer.timeout, Duration::from_secs(7));
        state.shutdown();
    }

    #[tokio::test]
    async fn test_start_fails_when_port_taken() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = local_config();
        config.serving.hostport = taken.local_addr().unwrap().to_string();

        let err = AppState::start(config).await.err().unwrap();
        assert!(err.message().starts_with("Could not listen for EVE Online logins"));
    }
}
