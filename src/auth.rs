//! OAuth client-credentials token lifecycle.
use crate::error::{AcquisitionError, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A bearer token and the moment it stops being accepted.
#[derive(Clone, Debug)]
pub struct Credential {
    pub token: String,
    pub expires_at: Instant,
}

/// The response body of a successful client-credentials exchange.
#[derive(Deserialize, Clone, Debug)]
pub struct Grant {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    Valid,
    Expiring,
    Invalid,
}

pub trait CredentialExchange {
    async fn exchange(&self) -> Result<Grant>;
}

pub trait TokenSource {
    /// A token that is not about to expire, exchanging for a new one when needed.
    async fn token(&mut self) -> Result<String>;

    /// A freshly exchanged token, regardless of what is cached.
    async fn force_refresh(&mut self) -> Result<String>;
}

pub struct OAuthClient {
    client: reqwest::Client,
    url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    pub fn new(client: reqwest::Client, url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }
}

impl CredentialExchange for OAuthClient {
    async fn exchange(&self) -> Result<Grant> {
        info!("Requesting OAuth token");
        let response = self
            .client
            .post(&self.url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AcquisitionError::AuthFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquisitionError::AuthFailure(format!("{status}: {body}")));
        }

        response
            .json::<Grant>()
            .await
            .map_err(|e| AcquisitionError::AuthFailure(format!("unreadable token response: {e}")))
    }
}

/// Caches the credential handed out by an exchange and renews it `refresh_margin`
/// before it expires.
pub struct TokenManager<E> {
    exchange: E,
    refresh_margin: Duration,
    credential: Option<Credential>,
}

impl<E: CredentialExchange> TokenManager<E> {
    pub fn new(exchange: E, refresh_margin: Duration) -> Self {
        Self {
            exchange,
            refresh_margin,
            credential: None,
        }
    }

    pub fn with_credential(exchange: E, refresh_margin: Duration, credential: Credential) -> Self {
        Self {
            exchange,
            refresh_margin,
            credential: Some(credential),
        }
    }

    pub fn state(&self) -> TokenState {
        let Some(credential) = &self.credential else {
            return TokenState::NoToken;
        };
        let now = Instant::now();
        if now >= credential.expires_at {
            return TokenState::Invalid;
        }
        match credential.expires_at.checked_sub(self.refresh_margin) {
            Some(renew_at) if now < renew_at => TokenState::Valid,
            _ => TokenState::Expiring,
        }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    async fn renew(&mut self) -> Result<String> {
        let granted = self.exchange.exchange().await.and_then(|grant| {
            let expires_at = Instant::now()
                .checked_add(Duration::from_secs(grant.expires_in))
                .ok_or_else(|| {
                    AcquisitionError::AuthFailure(format!(
                        "token lifetime of {}s is out of range",
                        grant.expires_in
                    ))
                })?;
            Ok(Credential {
                token: grant.access_token,
                expires_at,
            })
        });
        match granted {
            Ok(credential) => {
                debug!(
                    "Obtained token valid for {}s",
                    (credential.expires_at - Instant::now()).as_secs()
                );
                let token = credential.token.clone();
                self.credential = Some(credential);
                Ok(token)
            }
            Err(e) => {
                warn!("Token exchange failed: {e}");
                self.credential = None;
                Err(e)
            }
        }
    }
}

impl<E: CredentialExchange> TokenSource for TokenManager<E> {
    async fn token(&mut self) -> Result<String> {
        if self.state() == TokenState::Valid {
            if let Some(credential) = &self.credential {
                return Ok(credential.token.clone());
            }
        }
        self.renew().await
    }

    async fn force_refresh(&mut self) -> Result<String> {
        self.renew().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    /// Hands out `token-1`, `token-2`, ... and counts the exchanges.
    pub(crate) struct CountingExchange {
        pub calls: Cell<usize>,
        pub fail: bool,
        pub lifetime: u64,
    }

    impl CountingExchange {
        pub(crate) fn new() -> Self {
            Self {
                calls: Cell::new(0),
                fail: false,
                lifetime: 3600,
            }
        }

        pub(crate) fn lasting(lifetime: u64) -> Self {
            Self {
                lifetime,
                ..Self::new()
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    impl CredentialExchange for CountingExchange {
        async fn exchange(&self) -> Result<Grant> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(AcquisitionError::AuthFailure("401: invalid_client".to_string()));
            }
            Ok(Grant {
                access_token: format!("token-{}", self.calls.get()),
                expires_in: self.lifetime,
            })
        }
    }

    const MARGIN: Duration = Duration::from_secs(300);

    fn cached(expires_in: u64) -> Credential {
        Credential {
            token: "cached".to_string(),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_token_reused_outside_margin() {
        let mut tokens = TokenManager::with_credential(CountingExchange::new(), MARGIN, cached(301));
        assert_eq!(tokens.state(), TokenState::Valid);
        assert_eq!(tokens.token().await.unwrap(), "cached");
        assert_eq!(tokens.exchange().calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiring_token_is_exchanged() {
        let mut tokens = TokenManager::with_credential(CountingExchange::new(), MARGIN, cached(100));
        assert_eq!(tokens.state(), TokenState::Expiring);
        assert_eq!(tokens.token().await.unwrap(), "token-1");
        assert_eq!(tokens.exchange().calls.get(), 1);
        assert_eq!(tokens.state(), TokenState::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_exchanged_once_then_cached() {
        let mut tokens = TokenManager::new(CountingExchange::new(), MARGIN);
        assert_eq!(tokens.state(), TokenState::NoToken);
        tokens.token().await.unwrap();
        tokens.token().await.unwrap();
        assert_eq!(tokens.exchange().calls.get(), 1);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(tokens.state(), TokenState::Invalid);
        assert_eq!(tokens.token().await.unwrap(), "token-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_ignores_cache() {
        let mut tokens = TokenManager::with_credential(CountingExchange::new(), MARGIN, cached(3600));
        assert_eq!(tokens.force_refresh().await.unwrap(), "token-1");
        assert_eq!(tokens.exchange().calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_exchange_clears_credential() {
        let mut tokens = TokenManager::with_credential(CountingExchange::failing(), MARGIN, cached(3600));
        let result = tokens.force_refresh().await;
        assert!(matches!(result, Err(AcquisitionError::AuthFailure(_))));
        assert_eq!(tokens.state(), TokenState::NoToken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_lifetime_is_auth_failure() {
        let mut tokens = TokenManager::new(CountingExchange::lasting(u64::MAX), MARGIN);
        let result = tokens.token().await;
        assert!(matches!(result, Err(AcquisitionError::AuthFailure(_))));
        assert_eq!(tokens.state(), TokenState::NoToken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_margin_longer_than_lifetime_means_expiring() {
        let margin = Duration::from_secs(u64::MAX);
        let mut tokens = TokenManager::with_credential(CountingExchange::new(), margin, cached(3600));
        assert_eq!(tokens.state(), TokenState::Expiring);
        assert_eq!(tokens.token().await.unwrap(), "token-1");
    }
}
