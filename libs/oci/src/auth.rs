//! Registry credentials and `WWW-Authenticate` challenges.

use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::OciError;

/// Username/password pair for a registry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build credentials from optional caller input.
    ///
    /// Both parts empty means anonymous access and yields `None`.
    pub fn from_parts(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() && password.is_empty() {
            None
        } else {
            Some(Self::new(username, password))
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// `Authorization` header value for HTTP basic auth.
    pub fn basic_authorization(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl Challenge {
    pub(crate) fn parse(header: &str) -> Result<Self, OciError> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
        let params = parse_params(params);

        if scheme.eq_ignore_ascii_case("basic") {
            return Ok(Challenge::Basic);
        }

        if scheme.eq_ignore_ascii_case("bearer") {
            let realm = params.get("realm").cloned().ok_or_else(|| {
                OciError::Authentication("bearer challenge without realm".to_string())
            })?;
            return Ok(Challenge::Bearer {
                realm,
                service: params.get("service").cloned(),
                scope: params.get("scope").cloned(),
            });
        }

        Err(OciError::Authentication(format!(
            "unsupported authentication scheme {scheme:?}"
        )))
    }
}

/// Split `key="value", key2=value2` into a map. Quoted values may contain
/// commas, as scopes like `repository:a:pull,push` do.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some((key, after_eq)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();

        let (value, remaining) = if let Some(quoted) = after_eq.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after_eq.find(',') {
                Some(end) => (&after_eq[..end], &after_eq[end..]),
                None => (after_eq, ""),
            }
        };

        params.insert(key, value.trim().to_string());
        rest = remaining.trim_start_matches([',', ' ']);
    }

    params
}

/// Body of a token endpoint response. Docker Hub sends both fields, the
/// distribution spec only requires one.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token(self) -> Option<String> {
        self.token
            .or(self.access_token)
            .filter(|token| !token.is_empty())
    }
}
