//! Credential selection and the 403 retry state machine.
//!
//! # State Transitions
//! ```text
//! attempt 1:
//!     rule exists, client sent no Authorization → Configured
//!     otherwise                                  → Client (forwarded as-is)
//! on 403:
//!     Client(with auth), rule exists, configured not yet tried → Configured
//!     Configured injected without client auth                  → Anonymous
//!     anything else                                            → surface the 403
//! ```
//! At most [`MAX_ATTEMPTS`] attempts are made per inbound request.

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::HostAuthRule;

/// Upper bound on attempts per inbound request (two retries).
pub const MAX_ATTEMPTS: u32 = 3;

/// Which credentials one attempt carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChoice {
    /// The client's own Authorization header, if any.
    Client(Option<HeaderValue>),
    /// Credentials from the host's [`HostAuthRule`].
    Configured,
    /// No credentials at all.
    Anonymous,
}

impl AuthChoice {
    /// Credentials for the first attempt.
    pub fn initial(rule: Option<&HostAuthRule>, client_auth: Option<&HeaderValue>) -> Self {
        match (rule, client_auth) {
            (Some(_), None) => AuthChoice::Configured,
            (_, client) => AuthChoice::Client(client.cloned()),
        }
    }

    /// Write this choice's credentials into `headers`, replacing any
    /// Authorization already present.
    pub fn apply(&self, headers: &mut HeaderMap, rule: Option<&HostAuthRule>) {
        headers.remove(AUTHORIZATION);
        match self {
            AuthChoice::Client(Some(value)) => {
                headers.insert(AUTHORIZATION, value.clone());
            }
            AuthChoice::Client(None) | AuthChoice::Anonymous => {}
            AuthChoice::Configured => match rule {
                Some(HostAuthRule::Authorization(value)) => match HeaderValue::from_str(value) {
                    Ok(value) => {
                        headers.insert(AUTHORIZATION, value);
                    }
                    Err(_) => tracing::warn!("Configured authorization is not a valid header value"),
                },
                Some(HostAuthRule::Headers(pairs)) => {
                    for pair in pairs {
                        match (
                            HeaderName::from_bytes(pair.name.as_bytes()),
                            HeaderValue::from_str(&pair.value),
                        ) {
                            (Ok(name), Ok(value)) => {
                                headers.insert(name, value);
                            }
                            _ => tracing::warn!(header = %pair.name, "Skipping invalid configured header"),
                        }
                    }
                }
                None => {}
            },
        }
    }
}

/// Remove every credential an attempt may have added.
pub fn strip_credentials(headers: &mut HeaderMap, rule: Option<&HostAuthRule>) {
    headers.remove(AUTHORIZATION);
    if let Some(HostAuthRule::Headers(pairs)) = rule {
        for pair in pairs {
            if let Ok(name) = HeaderName::from_bytes(pair.name.as_bytes()) {
                headers.remove(name);
            }
        }
    }
}

/// Per-request retry bookkeeping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts_used: u32,
    pub tried_client_auth: bool,
    pub tried_configured_auth: bool,
}

impl RetryState {
    /// Record that an attempt is being made with `choice`.
    pub fn record(&mut self, choice: &AuthChoice) {
        self.attempts_used += 1;
        match choice {
            AuthChoice::Client(Some(_)) => self.tried_client_auth = true,
            AuthChoice::Configured => self.tried_configured_auth = true,
            AuthChoice::Client(None) | AuthChoice::Anonymous => {}
        }
    }

    /// Credentials for the next attempt after the origin answered 403, or
    /// `None` when the 403 should be surfaced.
    pub fn next_after_forbidden(
        &self,
        last: &AuthChoice,
        rule: Option<&HostAuthRule>,
    ) -> Option<AuthChoice> {
        if self.attempts_used >= MAX_ATTEMPTS {
            return None;
        }
        match last {
            AuthChoice::Client(Some(_)) if rule.is_some() && !self.tried_configured_auth => {
                Some(AuthChoice::Configured)
            }
            AuthChoice::Configured if !self.tried_client_auth => Some(AuthChoice::Anonymous),
            _ => None,
        }
    }
}
