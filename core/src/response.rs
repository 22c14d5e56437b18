//! Raw transport responses and the snapshot handed back by single-shot runs

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response data a transport writes into when the caller asks for it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    /// Status code
    pub status: u16,
    /// Headers in wire order; repeated names appear repeatedly
    pub headers: Vec<(String, String)>,
    /// Body bytes
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Reset every field, keeping allocated capacity
    pub fn clear(&mut self) {
        self.status = 0;
        self.headers.clear();
        self.body.clear();
    }

    /// Values of every `Set-Cookie` header
    pub fn set_cookies(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, value)| value.as_str())
    }
}

/// Response returned by a single-shot run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    /// Status code, 0 when no response was received
    pub status_code: u16,
    /// Body, lossily decoded as UTF-8
    pub body: String,
    /// Last value seen for each header name
    pub headers: BTreeMap<String, String>,
    /// Cookies that had not expired at snapshot time
    pub cookies: BTreeMap<String, String>,
}

impl ResponseSnapshot {
    /// Build a snapshot, dropping cookies that expired before `now`
    pub fn from_raw(raw: &RawResponse, now: DateTime<Utc>) -> Self {
        let headers = raw
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut cookies = BTreeMap::new();
        for header in raw.set_cookies() {
            let Some(cookie) = SetCookie::parse(header) else {
                continue;
            };
            if cookie.is_expired(now) {
                tracing::debug!(cookie = %cookie.name, "Cookie from the response expired");
                continue;
            }
            cookies.insert(cookie.name, cookie.value);
        }

        Self {
            status_code: raw.status,
            body: String::from_utf8_lossy(&raw.body).into_owned(),
            headers,
            cookies,
        }
    }
}

/// The parts of a `Set-Cookie` header the snapshot cares about
#[derive(Debug, Clone, PartialEq, Eq)]
struct SetCookie {
    name: String,
    value: String,
    expires: Option<DateTime<Utc>>,
    max_age: Option<i64>,
}

impl SetCookie {
    fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = SetCookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            expires: None,
            max_age: None,
        };

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((key, val)) => (key.trim(), val.trim()),
                None => (attribute.trim(), ""),
            };
            if key.eq_ignore_ascii_case("expires") {
                // An unparseable date is treated as no expiry
                cookie.expires = parse_cookie_date(val);
            } else if key.eq_ignore_ascii_case("max-age") {
                cookie.max_age = val.parse().ok();
            }
        }

        Some(cookie)
    }

    // Max-Age takes precedence over Expires (RFC 6265 5.3)
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.max_age, self.expires) {
            (Some(max_age), _) => max_age <= 0,
            (None, Some(expires)) => expires < now,
            (None, None) => false,
        }
    }
}

fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    ["%a, %d-%b-%Y %H:%M:%S GMT", "%a, %d-%b-%y %H:%M:%S GMT", "%A, %d-%b-%y %H:%M:%S GMT"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
