//! Shape checks for stored check records.
//!
//! Records come straight from the store and may be partial or malformed. A
//! record is either fully normalized into a [`Check`] or rejected as a whole;
//! nothing is written back from here.

use monitor_core::{
    Error,
    models::{Check, CheckState, HttpMethod, LastChecked, Protocol},
};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

const ID_LEN: usize = 22;
const PHONE_LEN: usize = 10;
const MIN_TIMEOUT_SECS: f64 = 1.0;
const MAX_TIMEOUT_SECS: f64 = 5.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("id must be a 22 character string")]
    Id,
    #[error("owner phone must be a 10 character string")]
    Owner,
    #[error("protocol must be http or https")]
    Protocol,
    #[error("url must be a non-empty string that forms a valid target")]
    Url,
    #[error("method must be one of get, post, put, delete")]
    Method,
    #[error("successCodes must be a non-empty list of HTTP status codes")]
    SuccessCodes,
    #[error("timeoutSeconds must be a whole number from 1 to 5")]
    Timeout,
    #[error("id does not match the key the record is stored under")]
    IdMismatch,
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Error::validation(rejection.to_string())
    }
}

fn trimmed_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).map(str::trim)
}

fn success_codes(value: Option<&Value>) -> Option<BTreeSet<u16>> {
    let items = value?.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .filter(|code| (100..=599).contains(code))
                .map(|code| code as u16)
        })
        .collect()
}

fn timeout_seconds(value: Option<&Value>) -> Option<u8> {
    let secs = value?.as_f64()?;
    if secs.fract() != 0.0 || !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) {
        return None;
    }
    Some(secs as u8)
}

/// Normalize a raw check record or reject it.
///
/// `state` defaults to down and `lastChecked` to never when missing or
/// unusable. Validating the serialized form of a returned check yields the
/// same check again.
pub fn validate(raw: &Value) -> Result<Check, Rejection> {
    let obj = raw.as_object().ok_or(Rejection::NotAnObject)?;

    let id = trimmed_str(obj, "id")
        .filter(|id| id.chars().count() == ID_LEN)
        .ok_or(Rejection::Id)?;

    let owner_id = trimmed_str(obj, "userPhone")
        .or_else(|| trimmed_str(obj, "ownerId"))
        .filter(|phone| phone.chars().count() == PHONE_LEN)
        .ok_or(Rejection::Owner)?;

    let protocol = trimmed_str(obj, "protocol")
        .and_then(Protocol::parse)
        .ok_or(Rejection::Protocol)?;

    let url = trimmed_str(obj, "url")
        .filter(|url| !url.is_empty())
        .ok_or(Rejection::Url)?;

    let method = trimmed_str(obj, "method")
        .and_then(HttpMethod::parse)
        .ok_or(Rejection::Method)?;

    let success_codes = success_codes(obj.get("successCodes")).ok_or(Rejection::SuccessCodes)?;
    let timeout_seconds = timeout_seconds(obj.get("timeoutSeconds")).ok_or(Rejection::Timeout)?;

    let state = obj
        .get("state")
        .and_then(Value::as_str)
        .and_then(CheckState::parse)
        .unwrap_or_default();
    let last_checked = LastChecked::from_json(obj.get("lastChecked"));

    let check = Check {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        protocol,
        url: url.to_string(),
        method,
        success_codes,
        timeout_seconds,
        state,
        last_checked,
    };

    match check.target() {
        Ok(target) if target.host_str().is_some_and(|host| !host.is_empty()) => Ok(check),
        _ => Err(Rejection::Url),
    }
}

/// [`validate`] a record read from the store under `key`. The record's own id
/// must be that key.
pub fn validate_stored(key: &str, raw: &Value) -> Result<Check, Rejection> {
    let check = validate(raw)?;
    if check.id != key {
        return Err(Rejection::IdMismatch);
    }
    Ok(check)
}
