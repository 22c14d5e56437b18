//! Request descriptors and the materializer that fills them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

use crate::template::{TemplateContext, TemplateError, TemplateEvaluator};

/// Concrete request values produced by a template evaluator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Cookies
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    /// Body
    #[serde(default)]
    pub body: String,
}

/// One iteration's materialized request
///
/// The job loop keeps a single descriptor and refills it every iteration;
/// [`RequestDescriptor::fill`] clears every field first, so the buffers are
/// reused without carrying values across iterations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Upper-case HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Host portion of the URL
    pub host: String,
    /// Headers in template order
    pub headers: Vec<(String, String)>,
    /// Cookies in template order
    pub cookies: Vec<(String, String)>,
    /// Body bytes
    pub body: Vec<u8>,
}

impl RequestDescriptor {
    /// Build a descriptor from concrete values
    pub fn from_config(config: RequestConfig) -> Result<(Self, usize), TemplateError> {
        let mut request = Self::default();
        let size = request.fill(config)?;
        Ok((request, size))
    }

    /// Reset every field, keeping allocated capacity
    pub fn clear(&mut self) {
        self.method.clear();
        self.url.clear();
        self.host.clear();
        self.headers.clear();
        self.cookies.clear();
        self.body.clear();
    }

    /// Overwrite this descriptor with `config`
    ///
    /// Returns the outbound payload size in bytes.
    pub fn fill(&mut self, config: RequestConfig) -> Result<usize, TemplateError> {
        self.clear();

        let method = config.method.trim();
        validate_method(method)?;
        self.method.extend(method.chars().map(|c| c.to_ascii_uppercase()));

        let url = Url::parse(config.url.trim())
            .map_err(|e| TemplateError::invalid("url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TemplateError::invalid(
                "url",
                format!("unsupported scheme {}", url.scheme()),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| TemplateError::invalid("url", "missing host"))?;
        self.host.push_str(host);
        self.url.push_str(url.as_str());

        for (name, value) in config.headers {
            validate_header(&name, &value)?;
            self.headers.push((name, value));
        }
        for (name, value) in config.cookies {
            validate_cookie(&name, &value)?;
            self.cookies.push((name, value));
        }
        self.body.extend_from_slice(config.body.as_bytes());

        Ok(self.wire_size_with(&url))
    }

    /// Outbound payload size as an HTTP/1.1 request
    pub fn wire_size(&self) -> usize {
        Url::parse(&self.url)
            .map(|url| self.wire_size_with(&url))
            .unwrap_or(self.body.len())
    }

    // Request line, Host, headers, Cookie, Content-Length, blank line, body.
    fn wire_size_with(&self, url: &Url) -> usize {
        let target_len = url.path().len() + url.query().map(|q| q.len() + 1).unwrap_or(0);
        let mut size = self.method.len() + 1 + target_len + " HTTP/1.1\r\n".len();

        let host_len = self.host.len() + url.port().map(|p| p.to_string().len() + 1).unwrap_or(0);
        if !self.has_header("host") {
            size += "Host: ".len() + host_len + 2;
        }

        size += self
            .headers
            .iter()
            .map(|(name, value)| name.len() + 2 + value.len() + 2)
            .sum::<usize>();

        if !self.cookies.is_empty() {
            let pairs: usize = self
                .cookies
                .iter()
                .map(|(name, value)| name.len() + 1 + value.len())
                .sum();
            let separators = (self.cookies.len() - 1) * 2;
            size += "Cookie: ".len() + pairs + separators + 2;
        }

        if !self.body.is_empty() && !self.has_header("content-length") {
            size += "Content-Length: ".len() + self.body.len().to_string().len() + 2;
        }

        size + 2 + self.body.len()
    }

    /// Whether a header with this name (case-insensitive) is set
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// `name=value; name=value` form of the cookies, if any
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

fn validate_method(method: &str) -> Result<(), TemplateError> {
    if is_token(method) {
        Ok(())
    } else {
        Err(TemplateError::invalid("method", format!("{method:?}")))
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), TemplateError> {
    if !is_token(name) {
        return Err(TemplateError::invalid("header name", format!("{name:?}")));
    }
    if value.contains(['\r', '\n']) {
        return Err(TemplateError::invalid(
            format!("header {name}"),
            "value contains a line break",
        ));
    }
    Ok(())
}

fn validate_cookie(name: &str, value: &str) -> Result<(), TemplateError> {
    if !is_token(name) {
        return Err(TemplateError::invalid("cookie name", format!("{name:?}")));
    }
    if value.contains([';', '\r', '\n']) {
        return Err(TemplateError::invalid(
            format!("cookie {name}"),
            "value contains a separator",
        ));
    }
    Ok(())
}

/// Turns a compiled template plus per-iteration context into a descriptor
#[derive(Clone)]
pub struct RequestMaterializer {
    evaluator: Arc<dyn TemplateEvaluator>,
}

impl RequestMaterializer {
    /// Create a materializer over an evaluator
    pub fn new(evaluator: Arc<dyn TemplateEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Evaluate the template and overwrite `request` with the result
    ///
    /// Returns the outbound payload size so callers can meter it.
    pub fn materialize(
        &self,
        ctx: &TemplateContext,
        request: &mut RequestDescriptor,
    ) -> Result<usize, TemplateError> {
        let config = self.evaluator.execute(ctx)?;
        request.fill(config)
    }
}

impl std::fmt::Debug for RequestMaterializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestMaterializer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{RequestTemplate, RequestTemplateConfig};

    fn config(method: &str, url: &str) -> RequestConfig {
        RequestConfig {
            method: method.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_wire_size_simple_get() {
        let (request, size) =
            RequestDescriptor::from_config(config("get", "http://example.com/a?b=c")).unwrap();

        let expected = "GET /a?b=c HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert_eq!(request.method, "GET");
        assert_eq!(request.host, "example.com");
        assert_eq!(size, expected.len());
        assert_eq!(request.wire_size(), size);
    }

    #[test]
    fn test_wire_size_headers_cookies_body() {
        let mut cfg = config("POST", "http://example.com:8080/submit");
        cfg.headers.insert("X-A".into(), "1".into());
        cfg.cookies.insert("a".into(), "1".into());
        cfg.cookies.insert("b".into(), "22".into());
        cfg.body = "hello".into();

        let (request, size) = RequestDescriptor::from_config(cfg).unwrap();
        let expected = "POST /submit HTTP/1.1\r\n\
                        Host: example.com:8080\r\n\
                        X-A: 1\r\n\
                        Cookie: a=1; b=22\r\n\
                        Content-Length: 5\r\n\
                        \r\n\
                        hello";
        assert_eq!(size, expected.len());
        assert_eq!(request.cookie_header().as_deref(), Some("a=1; b=22"));
    }

    #[test]
    fn test_fill_overwrites_previous_iteration() {
        let mut first = config("POST", "http://one.example/");
        first.headers.insert("X-Old".into(), "1".into());
        first.cookies.insert("old".into(), "1".into());
        first.body = "old body".into();

        let mut request = RequestDescriptor::default();
        request.fill(first).unwrap();
        request.fill(config("GET", "http://two.example/")).unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.host, "two.example");
        assert!(request.headers.is_empty());
        assert!(request.cookies.is_empty());
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_invalid_values() {
        assert!(RequestDescriptor::from_config(config("GE T", "http://x/")).is_err());
        assert!(RequestDescriptor::from_config(config("GET", "not a url")).is_err());
        assert!(RequestDescriptor::from_config(config("GET", "ftp://x/")).is_err());

        let mut bad_header = config("GET", "http://x/");
        bad_header.headers.insert("X-A".into(), "a\r\nInjected: 1".into());
        assert!(RequestDescriptor::from_config(bad_header).is_err());

        let mut bad_cookie = config("GET", "http://x/");
        bad_cookie.cookies.insert("a".into(), "1; b=2".into());
        assert!(RequestDescriptor::from_config(bad_cookie).is_err());
    }

    #[test]
    fn test_materializer_reports_size() {
        let template = RequestTemplate::parse(
            &RequestTemplateConfig::get("http://example.com/{{iteration}}").with_body("x"),
        )
        .unwrap();
        let materializer = RequestMaterializer::new(Arc::new(template));

        let mut request = RequestDescriptor::default();
        let size = materializer
            .materialize(&TemplateContext::new("t", 12), &mut request)
            .unwrap();

        assert_eq!(request.url, "http://example.com/12");
        assert_eq!(size, request.wire_size());
        assert_eq!(request.body, b"x");
    }
}
