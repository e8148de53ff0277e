//! HTTP client for the eventshub API.
//!
//! Logs in lazily, sends the token in the `Token` header, and on a 401
//! logs in again and retries, up to [`MAX_ATTEMPTS`] requests per call.

use std::time::Duration;

use eventshub_core::Event;
use eventshub_protocol::{AddEventRequest, AddEventResponse, ResponseStatus, TokenMessage, routes};
use reqwest::{Certificate, Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::{ImportConfig, ImportCredentials};
use crate::error::{ImportError, ImportResult};

/// Requests sent per call before giving up on a 401.
pub const MAX_ATTEMPTS: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for an eventshub server.
pub struct EventsHubClient {
    http: Client,
    base_url: String,
    credentials: ImportCredentials,
    token: Option<String>,
}

impl EventsHubClient {
    /// Creates a client for the server named in `config`.
    ///
    /// # Errors
    ///
    /// Fails if the CA bundle cannot be read or parsed, or if the HTTP
    /// client cannot be built.
    pub fn new(config: &ImportConfig, credentials: ImportCredentials) -> ImportResult<Self> {
        let mut builder = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("eventshub-import/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &credentials.ca_certificate {
            let pem = std::fs::read(path).map_err(|e| ImportError::io(path, e))?;
            let certificate = Certificate::from_pem(&pem).map_err(|e| ImportError::Certificate {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            debug!(path = %path.display(), "Trusting extra CA certificate");
            builder = builder.add_root_certificate(certificate);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url(),
            credentials,
            token: None,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Logs in and keeps the returned token.
    ///
    /// # Errors
    ///
    /// [`ImportError::Login`] if the server refuses the credentials.
    pub async fn login(&mut self) -> ImportResult<()> {
        debug!(user = %self.credentials.username, "Requesting token");
        let response = self
            .http
            .post(self.url(routes::LOGIN))
            .json(&self.credentials.to_login())
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ImportError::Login {
                status: status.as_u16(),
            });
        }
        let TokenMessage { token } = response.json().await?;
        info!("Obtained token");
        self.token = Some(token);
        Ok(())
    }

    /// Posts `body` to `route`, refreshing the token on 401.
    async fn post_authorized<B, R>(&mut self, route: &str, body: &B) -> ImportResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            let token = match &self.token {
                Some(token) => token.clone(),
                None => {
                    self.login().await?;
                    self.token.clone().unwrap_or_default()
                }
            };

            let response = self
                .http
                .post(self.url(route))
                .header(routes::TOKEN_HEADER, token)
                .json(body)
                .send()
                .await?;

            match response.status() {
                StatusCode::OK => return Ok(response.json().await?),
                StatusCode::UNAUTHORIZED => {
                    warn!(attempt, "Unauthorized, refreshing token");
                    self.token = None;
                }
                status => {
                    let message = response
                        .json::<ResponseStatus>()
                        .await
                        .map(|status| status.message)
                        .unwrap_or_default();
                    return Err(ImportError::Rejected {
                        status: status.as_u16(),
                        message,
                    });
                }
            }
        }
        Err(ImportError::Unauthorized {
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Submits one event.
    ///
    /// # Errors
    ///
    /// Transport errors, [`ImportError::Rejected`] for a non-200 answer and
    /// [`ImportError::Unauthorized`] once the retries are exhausted.
    pub async fn insert_event(&mut self, event: Event) -> ImportResult<AddEventResponse> {
        let request = AddEventRequest { event };
        self.post_authorized(routes::INSERT_EVENT, &request).await
    }

    #[cfg(test)]
    pub(crate) fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }
}

#[cfg(test)]
mod tests {
    use eventshub_core::Moment;

    use super::*;
    use crate::testing::TestServer;

    fn standup() -> Event {
        Event::new("abc", "Standup").with_span(
            Moment::new(2024, 2, 13, 9, 0),
            Moment::new(2024, 2, 13, 9, 30),
        )
    }

    #[tokio::test]
    async fn logs_in_lazily_and_inserts() {
        let server = TestServer::start(Duration::from_secs(60)).await;
        let mut client = EventsHubClient::new(&server.config, server.credentials()).unwrap();

        let response = client.insert_event(standup()).await.unwrap();
        assert!(response.status.success);
        assert_eq!(response.status.message, "inserted");
        assert!(server.repository.get_by_uuid("abc").unwrap().is_some());

        server.stop().await;
    }

    #[tokio::test]
    async fn stale_token_is_refreshed() {
        let server = TestServer::start(Duration::from_secs(60)).await;
        let mut client = EventsHubClient::new(&server.config, server.credentials()).unwrap();
        client.set_token("not-a-token");

        let response = client.insert_event(standup()).await.unwrap();
        assert!(response.status.success);

        server.stop().await;
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        // Every token is already expired when issued.
        let server = TestServer::start(Duration::ZERO).await;
        let mut client = EventsHubClient::new(&server.config, server.credentials()).unwrap();

        let err = client.insert_event(standup()).await.unwrap_err();
        assert!(matches!(err, ImportError::Unauthorized { attempts: MAX_ATTEMPTS }));
        assert!(server.repository.get_by_uuid("abc").unwrap().is_none());

        server.stop().await;
    }

    #[tokio::test]
    async fn wrong_password_fails_login() {
        let server = TestServer::start(Duration::from_secs(60)).await;
        let mut client =
            EventsHubClient::new(&server.config, ImportCredentials::new("admin", "nope")).unwrap();

        assert!(matches!(
            client.login().await,
            Err(ImportError::Login { status: 401 })
        ));

        server.stop().await;
    }

    #[tokio::test]
    async fn bad_request_is_rejected_with_message() {
        let server = TestServer::start(Duration::from_secs(60)).await;
        let mut client = EventsHubClient::new(&server.config, server.credentials()).unwrap();

        let err = client
            .insert_event(Event::new("", "No uuid"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::Rejected { status: 400, ref message } if !message.is_empty()
        ));

        server.stop().await;
    }

    #[test]
    fn unreadable_ca_certificate() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ImportConfig {
            host: "localhost".into(),
            port: 8443,
            source_files_paths: Vec::new(),
            scheme: "https".into(),
        };

        let missing = ImportCredentials::new("admin", "pw")
            .with_ca_certificate(dir.path().join("missing.pem"));
        assert!(matches!(
            EventsHubClient::new(&config, missing),
            Err(ImportError::Io { .. })
        ));
    }
}
