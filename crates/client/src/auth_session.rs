//! Authenticated-user provider consumed by the realtime manager.
//!
//! Session issuance happens elsewhere; this module only tracks who is signed
//! in and where the hosting page lives, so the manager knows when it may
//! connect and which endpoint to dial.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

use crate::error::{ClientError, Result};

/// UI language of the signed-in user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ar,
}

/// Stored session data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub locale: Locale,
}

impl AuthSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            locale: Locale::default(),
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }
}

/// Host and transport security of the page the client runs on behalf of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    host: String,
    secure: bool,
}

impl Origin {
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
        }
    }

    /// Parse an origin such as `https://market.example.com` or `localhost:8080`.
    ///
    /// Without a scheme, local addresses are assumed to be plain http and
    /// everything else https.
    pub fn parse(origin: &str) -> Result<Self> {
        let trimmed = origin.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(invalid_origin(origin, "origin is empty"));
        }

        if !trimmed.contains("://") {
            return Ok(Self::new(trimmed, !is_local_address(trimmed)));
        }

        let url = Url::parse(trimmed).map_err(|e| invalid_origin(origin, e))?;
        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => return Err(invalid_origin(origin, format!("unsupported scheme {other}"))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| invalid_origin(origin, "missing host"))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self { host, secure })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Realtime endpoint on the same host, `wss` when the page itself is secure.
    pub fn ws_url(&self, path: &str) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let path = path.trim_start_matches('/');
        let raw = format!("{scheme}://{}/{path}", self.host);
        Url::parse(&raw).map_err(|e| invalid_origin(&raw, e))
    }
}

fn invalid_origin(origin: &str, reason: impl ToString) -> ClientError {
    ClientError::InvalidOrigin {
        origin: origin.to_string(),
        reason: reason.to_string(),
    }
}

/// Check if a host is a local/development address.
fn is_local_address(host: &str) -> bool {
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
}

/// Authentication context shared between the app and the realtime manager
#[derive(Clone, Debug)]
pub struct AuthContext {
    session: Arc<watch::Sender<Option<AuthSession>>>,
    origin: Origin,
}

impl AuthContext {
    pub fn new(origin: Origin) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            session: Arc::new(session),
            origin,
        }
    }

    pub fn login(&self, session: AuthSession) {
        tracing::info!(user_id = %session.user_id, "session authenticated");
        self.session.send_replace(Some(session));
    }

    /// Logout and clear session
    pub fn logout(&self) {
        if self.session.send_replace(None).is_some() {
            tracing::info!("session ended");
        }
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.session.borrow().clone()
    }

    /// Check if user is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().is_some()
    }

    /// Get the current user ID
    pub fn user_id(&self) -> Option<String> {
        self.session.borrow().as_ref().map(|s| s.user_id.clone())
    }

    /// Watch for login/logout.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.session.subscribe()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}
