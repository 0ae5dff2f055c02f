use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use http::{StatusCode, header::COOKIE};
use reqwest::{Client, Url, redirect};
use serde::Serialize;
use tokio::time::sleep;

use super::{
    endpoint::Action,
    error::{Error, Result},
    response::Response,
    session::Session,
};
use crate::prelude::*;

const AURA_PATH: &str = "/s/sfsites/aura";

// language=json
const AURA_CONTEXT: &str = r#"{"mode":"PROD","fwuid":"","app":"siteforce:communityApp","loaded":{},"dn":[],"globals":{},"uad":false}"#;

/// Bounded retries of network-level failures.
#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry, doubled after each failed attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_secs(1) }
    }
}

enum Failure {
    Retryable(reqwest::Error),
    Fatal(Error),
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self::Fatal(error)
    }
}

/// Sends Aura actions, attaching the session when there is one.
///
/// Knows nothing about logging in: a rejected session is reported to the caller.
pub struct Transport {
    client: Client,
    base_url: Url,
    aura_url: Url,
    retry_policy: RetryPolicy,
    sequence: AtomicU64,
}

impl Transport {
    pub fn new(
        base_url: Url,
        timeout: Duration,
        retry_policy: RetryPolicy,
    ) -> crate::prelude::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("edistribucion/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        let aura_url = base_url.join(AURA_PATH)?;
        Ok(Self { client, base_url, aura_url, retry_policy, sequence: AtomicU64::new(0) })
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(operation = action.operation))]
    pub async fn send_action<P: Serialize>(
        &self,
        session: Option<&Session>,
        action: &Action<P>,
    ) -> Result<serde_json::Value> {
        let message = action
            .message()
            .map_err(|source| Error::Encode { operation: action.operation, source })?;
        let mut backoff = self.retry_policy.backoff;
        let mut attempt = 1;
        loop {
            match self.try_send(session, action, &message).await {
                Ok(return_value) => return Ok(return_value),
                Err(Failure::Fatal(error)) => return Err(error),
                Err(Failure::Retryable(source)) if attempt >= self.retry_policy.max_attempts => {
                    return Err(Error::Transport { attempts: attempt, source });
                }
                Err(Failure::Retryable(error)) => {
                    warn!(attempt, ?backoff, "transport failure, retrying: {error:#}");
                    sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_send<P: Serialize>(
        &self,
        session: Option<&Session>,
        action: &Action<P>,
        message: &str,
    ) -> Result<serde_json::Value, Failure> {
        let operation = action.operation;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let token = session.map_or("undefined", |session| session.token.as_str());
        let mut request = self
            .client
            .post(self.aura_url.clone())
            .query(&[
                (String::from("r"), sequence.to_string()),
                (action.query_key(), String::from("1")),
            ])
            .form(&[
                ("message", message),
                ("aura.context", AURA_CONTEXT),
                ("aura.pageURI", "/s/"),
                ("aura.token", token),
            ]);
        if let Some(session) = session {
            request = request.header(COOKIE, session.cookie.clone());
        }

        let response = request.send().await.map_err(Failure::Retryable)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status.is_redirection()
        {
            debug!(%status, "session rejected");
            return Err(Error::SessionRejected.into());
        }
        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(error) if status.is_server_error() => return Err(Failure::Retryable(error)),
            Err(error) => {
                return Err(Error::Portal { operation, message: error.to_string() }.into());
            }
        };
        let body = response.text().await.map_err(Failure::Retryable)?;
        debug!(n_bytes = body.len(), "received");
        Ok(Response::parse(operation, &body)?.into_return_value(operation)?)
    }

    /// Follow the front door URL returned by the login action and collect its cookies.
    #[instrument(skip_all, level = Level::DEBUG)]
    pub async fn open_front_door(&self, url: &str) -> Result<Session> {
        let url = self
            .base_url
            .join(url)
            .map_err(|error| Error::Auth(format!("invalid front door URL: {error}")))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| Error::Transport { attempts: 1, source })?;
        let status = response.status();
        if status.is_client_error() {
            return Err(Error::Auth(format!("the front door responded with {status}")));
        }
        let response =
            response.error_for_status().map_err(|source| Error::Transport { attempts: 1, source })?;
        let cookies: Vec<(String, String)> = response
            .cookies()
            .map(|cookie| (cookie.name().to_owned(), cookie.value().to_owned()))
            .collect();
        debug!(n_cookies = cookies.len(), "opened the front door");
        Session::from_cookies(&cookies)
    }
}
