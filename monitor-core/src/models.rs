use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::{collections::BTreeSet, fmt, time::Duration};
use url::Url;

use crate::error::{Error, Result};

/// Record collections held by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Tokens,
    Checks,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Tokens => "tokens",
            Collection::Checks => "checks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
        }
    }

    /// Method name as sent on the wire.
    pub fn as_upper(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Up,
    #[default]
    Down,
}

impl CheckState {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "up" => Some(CheckState::Up),
            "down" => Some(CheckState::Down),
            _ => None,
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckState::Up => write!(f, "up"),
            CheckState::Down => write!(f, "down"),
        }
    }
}

/// When a check was last probed.
///
/// `Never` is kept apart from every real timestamp. On disk it is written as
/// `false`, and `false`, `null`, a missing key, zero or a negative number all
/// read back as `Never`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LastChecked {
    #[default]
    Never,
    /// Milliseconds since the unix epoch.
    At(i64),
}

impl LastChecked {
    pub fn from_json(value: Option<&Value>) -> Self {
        let millis = value.and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));
        match millis {
            Some(ms) if ms > 0 => LastChecked::At(ms),
            _ => LastChecked::Never,
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, LastChecked::Never)
    }
}

impl Serialize for LastChecked {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            LastChecked::Never => serializer.serialize_bool(false),
            LastChecked::At(ms) => serializer.serialize_i64(*ms),
        }
    }
}

impl<'de> Deserialize<'de> for LastChecked {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(LastChecked::from_json(value.as_ref()))
    }
}

/// A monitored HTTP/HTTPS target and its pass criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: String,
    #[serde(rename = "userPhone", alias = "ownerId")]
    pub owner_id: String,
    pub protocol: Protocol,
    pub url: String,
    pub method: HttpMethod,
    pub success_codes: BTreeSet<u16>,
    pub timeout_seconds: u8,
    #[serde(default)]
    pub state: CheckState,
    #[serde(default)]
    pub last_checked: LastChecked,
}

impl Check {
    /// Combine protocol and url into the probe target.
    pub fn target(&self) -> Result<Url> {
        let raw = format!("{}://{}", self.protocol.as_str(), self.url);
        Url::parse(&raw).map_err(|e| Error::validation(format!("invalid target {raw}: {e}")))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_seconds) * 1000)
    }

    pub fn is_success_code(&self, code: u16) -> bool {
        self.success_codes.contains(&code)
    }

    pub fn alert_message(&self) -> String {
        format!(
            "Alert: Your check for {} {}://{} is currently {}.",
            self.method.as_upper(),
            self.protocol.as_str(),
            self.url,
            self.state
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "camelCase")]
pub enum NetworkError {
    /// DNS, connect, TLS or protocol failure.
    Transport(String),
    Timeout,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Transport(detail) => write!(f, "transport error: {detail}"),
            NetworkError::Timeout => write!(f, "timeout"),
        }
    }
}

/// Classified result of a single probe. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProbeOutcome {
    #[serde(rename_all = "camelCase")]
    Response { response_code: u16 },
    NetworkError { error: NetworkError },
}

impl ProbeOutcome {
    pub fn response(code: u16) -> Self {
        ProbeOutcome::Response { response_code: code }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        ProbeOutcome::NetworkError { error: NetworkError::Transport(detail.into()) }
    }

    pub fn timeout() -> Self {
        ProbeOutcome::NetworkError { error: NetworkError::Timeout }
    }

    pub fn response_code(&self) -> Option<u16> {
        match self {
            ProbeOutcome::Response { response_code } => Some(*response_code),
            ProbeOutcome::NetworkError { .. } => None,
        }
    }

    pub fn network_error(&self) -> Option<&NetworkError> {
        match self {
            ProbeOutcome::Response { .. } => None,
            ProbeOutcome::NetworkError { error } => Some(error),
        }
    }
}

/// One line of a check's log, written once per completed probe cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLogEntry {
    /// The check as it was before this cycle updated it.
    pub check: Check,
    pub outcome: ProbeOutcome,
    pub state: CheckState,
    pub alert: bool,
    /// Milliseconds since the unix epoch.
    pub time: i64,
}
