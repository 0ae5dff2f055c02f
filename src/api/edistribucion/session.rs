use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use http::HeaderValue;
use tokio::sync::Mutex;

use super::{
    endpoint,
    error::{Error, Result},
    transport::Transport,
};
use crate::prelude::*;

/// Cookie which carries the Aura token, when the portal sets it.
const TOKEN_COOKIE: &str = "aura_token";

/// Salesforce session cookie, which doubles as the token otherwise.
const SESSION_COOKIE: &str = "sid";

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Authentication artifacts issued by the portal on login.
///
/// Never mutated: a re-login replaces the whole value.
pub struct Session {
    pub(super) cookie: HeaderValue,
    pub(super) token: String,
    pub established_at: DateTime<Utc>,
}

impl Session {
    /// Assemble a session from the `(name, value)` cookies set by the front door.
    pub(super) fn from_cookies(cookies: &[(String, String)]) -> Result<Self> {
        let find = |name: &str| {
            cookies.iter().find(|(cookie_name, _)| cookie_name == name).map(|(_, value)| value)
        };
        let token = find(TOKEN_COOKIE)
            .or_else(|| find(SESSION_COOKIE))
            .ok_or_else(|| Error::Auth(String::from("the portal issued no session cookie")))?
            .clone();
        let cookie = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        let cookie = HeaderValue::from_str(&cookie)
            .map_err(|_| Error::Auth(String::from("the portal issued a malformed cookie")))?;
        Ok(Self { cookie, token, established_at: Utc::now() })
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("established_at", &self.established_at)
            .finish_non_exhaustive()
    }
}

/// Observable lifecycle of the client session.
///
/// `Authenticating` and `Reauthenticating` only exist while the session lock is held,
/// so callers never observe them: they wait for the outcome instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClientState {
    Unauthenticated,
    Authenticated,

    /// The portal rejected the session; the next call logs in again.
    Expired,

    /// Explicit login failed with bad credentials or lockout.
    AuthFailed,
}

enum Slot {
    Unauthenticated,
    Authenticated(Arc<Session>),
    Expired,
    AuthFailed,
}

struct Inner {
    slot: Slot,
    credentials: Option<Credentials>,
}

/// Owns the only session of a client.
///
/// The lock is held for the whole duration of a login, which makes concurrent callers
/// wait for an in-flight re-login instead of starting their own.
pub struct SessionManager {
    inner: Mutex<Inner>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self { inner: Mutex::new(Inner { slot: Slot::Unauthenticated, credentials: None }) }
    }
}

impl SessionManager {
    pub async fn state(&self) -> ClientState {
        match self.inner.lock().await.slot {
            Slot::Unauthenticated => ClientState::Unauthenticated,
            Slot::Authenticated(_) => ClientState::Authenticated,
            Slot::Expired => ClientState::Expired,
            Slot::AuthFailed => ClientState::AuthFailed,
        }
    }

    /// Explicit login which replaces any current session.
    pub async fn login(&self, transport: &Transport, credentials: Credentials) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match authenticate(transport, &credentials).await {
            Ok(session) => {
                inner.slot = Slot::Authenticated(Arc::new(session));
                inner.credentials = Some(credentials);
                Ok(())
            }
            Err(error @ Error::Auth(_)) => {
                inner.slot = Slot::AuthFailed;
                inner.credentials = None;
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Return the current session, silently logging in again if it has expired.
    ///
    /// The flag is set when this very call has logged in.
    pub async fn ensure_valid(&self, transport: &Transport) -> Result<(Arc<Session>, bool)> {
        let mut inner = self.inner.lock().await;
        match &inner.slot {
            Slot::Authenticated(session) => return Ok((Arc::clone(session), false)),
            Slot::Unauthenticated | Slot::AuthFailed => return Err(Error::NotAuthenticated),
            Slot::Expired => {}
        }
        let credentials = inner.credentials.clone().ok_or(Error::NotAuthenticated)?;
        info!("re-authenticating…");
        match authenticate(transport, &credentials).await {
            Ok(session) => {
                let session = Arc::new(session);
                inner.slot = Slot::Authenticated(Arc::clone(&session));
                Ok((session, true))
            }
            Err(error @ Error::Auth(_)) => {
                // Rejected credentials are never retried: that may lock the account.
                inner.slot = Slot::AuthFailed;
                inner.credentials = None;
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Mark the session as expired, unless it has been replaced already.
    pub async fn expire(&self, stale: &Arc<Session>) {
        let mut inner = self.inner.lock().await;
        if let Slot::Authenticated(current) = &inner.slot
            && Arc::ptr_eq(current, stale)
        {
            debug!(established_at = %stale.established_at, "session expired");
            inner.slot = Slot::Expired;
        }
    }
}

#[instrument(skip_all, fields(username = %credentials.username))]
async fn authenticate(transport: &Transport, credentials: &Credentials) -> Result<Session> {
    info!("logging in…");
    let front_door = match transport.send_action(None, &endpoint::login(credentials)).await {
        Ok(serde_json::Value::String(url)) => url,
        Ok(value) => {
            return Err(Error::Auth(format!("the portal did not return a front door: {value}")));
        }
        Err(Error::Portal { message, .. }) => return Err(Error::Auth(message)),
        Err(Error::SessionRejected) => {
            return Err(Error::Auth(String::from("the portal rejected the login request")));
        }
        Err(error) => return Err(error),
    };
    let session = transport.open_front_door(&front_door).await?;
    info!("logged in");
    Ok(session)
}
