//! Request templates and their evaluation context
//!
//! A job's request is described by a [`RequestTemplateConfig`] whose string
//! fields are Handlebars templates. [`RequestTemplate::parse`] compiles them
//! once when the job starts; [`TemplateEvaluator::execute`] renders them every
//! iteration against a fresh [`TemplateContext`].
//!
//! Available variables: `job`, `iteration`, `timestamp` (unix seconds), `now`
//! (RFC 3339) and `seed`. Available helpers: `rand_int lo hi`,
//! `rand_alpha len` and `uuid`.

use chrono::{DateTime, Utc};
use handlebars::{
    handlebars_helper, Context, Handlebars, Helper, HelperResult, Output, RenderContext,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::request::RequestConfig;

/// Raw request template as written in the job configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTemplateConfig {
    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    /// Absolute target URL
    #[serde(alias = "path")]
    pub url: String,

    /// Request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Cookies sent with the request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies: BTreeMap<String, String>,

    /// Request body
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequestTemplateConfig {
    /// Create a GET template for the given URL
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Set the method
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a cookie
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Per-iteration values visible to templates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateContext {
    /// Job name
    pub job: String,
    /// Zero-based iteration index
    pub iteration: u64,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    /// Current time, RFC 3339
    pub now: String,
    /// Random seed drawn for this iteration
    pub seed: u64,
}

impl TemplateContext {
    /// Context for `iteration` at the current time with a random seed
    pub fn new(job: &str, iteration: u64) -> Self {
        Self::at(job, iteration, Utc::now(), rand::thread_rng().gen())
    }

    /// Context with explicit time and seed
    pub fn at(job: &str, iteration: u64, now: DateTime<Utc>, seed: u64) -> Self {
        Self {
            job: job.to_string(),
            iteration,
            timestamp: now.timestamp(),
            now: now.to_rfc3339(),
            seed,
        }
    }
}

/// Template parse and evaluation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    /// Template text is not valid
    #[error("failed to parse {field} template: {message}")]
    Parse {
        /// Request field the template belongs to
        field: String,
        /// Parser message
        message: String,
    },

    /// Template could not be rendered against the context
    #[error("failed to render {field} template: {message}")]
    Render {
        /// Request field the template belongs to
        field: String,
        /// Renderer message
        message: String,
    },

    /// Rendered value is not usable for a request
    #[error("invalid {field}: {message}")]
    InvalidValue {
        /// Request field
        field: String,
        /// What is wrong with it
        message: String,
    },
}

impl TemplateError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Produces concrete request values from a compiled template
pub trait TemplateEvaluator: Send + Sync {
    /// Render the template against `ctx`
    fn execute(&self, ctx: &TemplateContext) -> Result<RequestConfig, TemplateError>;
}

handlebars_helper!(rand_int: |lo: i64, hi: i64| {
    if lo >= hi {
        lo
    } else {
        rand::thread_rng().gen_range(lo..=hi)
    }
});

handlebars_helper!(rand_alpha: |len: u64| {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len.min(MAX_RANDOM_LEN) as usize)
        .map(char::from)
        .collect::<String>()
});

const MAX_RANDOM_LEN: u64 = 1 << 20;

fn uuid_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&uuid::Uuid::new_v4().to_string())?;
    Ok(())
}

/// Strict registry with the job helpers and no HTML escaping
fn registry() -> Handlebars<'static> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_escape_fn(handlebars::no_escape);
    registry.register_helper("rand_int", Box::new(rand_int));
    registry.register_helper("rand_alpha", Box::new(rand_alpha));
    registry.register_helper("uuid", Box::new(uuid_helper));
    registry
}

fn render_source(
    registry: &mut Handlebars<'static>,
    field: &str,
    source: &str,
    ctx: &TemplateContext,
) -> Result<String, TemplateError> {
    registry
        .register_template_string(field, source)
        .map_err(|e| TemplateError::Parse {
            field: field.to_string(),
            message: e.to_string(),
        })?;
    registry.render(field, ctx).map_err(|e| TemplateError::Render {
        field: field.to_string(),
        message: e.to_string(),
    })
}

/// Render a single template string once, e.g. a proxy list
pub fn render_string(
    field: &str,
    source: &str,
    ctx: &TemplateContext,
) -> Result<String, TemplateError> {
    render_source(&mut registry(), field, source, ctx)
}

/// Render every string inside a JSON value, keeping its shape
///
/// Used for client settings, which may themselves be templated. Errors name
/// the offending entry as `field.key` or `field[index]`.
pub fn render_json(
    field: &str,
    value: &serde_json::Value,
    ctx: &TemplateContext,
) -> Result<serde_json::Value, TemplateError> {
    render_value(&mut registry(), field, value, ctx)
}

fn render_value(
    registry: &mut Handlebars<'static>,
    field: &str,
    value: &serde_json::Value,
    ctx: &TemplateContext,
) -> Result<serde_json::Value, TemplateError> {
    use serde_json::Value;

    match value {
        Value::String(source) => Ok(Value::String(render_source(registry, field, source, ctx)?)),
        Value::Array(items) => {
            let mut rendered = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                rendered.push(render_value(registry, &format!("{field}[{index}]"), item, ctx)?);
            }
            Ok(Value::Array(rendered))
        }
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                let item = render_value(registry, &format!("{field}.{key}"), item, ctx)?;
                rendered.insert(key.clone(), item);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

const METHOD: &str = "method";
const URL: &str = "url";
const BODY: &str = "body";

/// Compiled Handlebars request template
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    registry: Handlebars<'static>,
    headers: Vec<String>,
    cookies: Vec<String>,
}

impl RequestTemplate {
    /// Compile every field of `config`
    pub fn parse(config: &RequestTemplateConfig) -> Result<Self, TemplateError> {
        let mut registry = registry();
        let mut register = |name: String, source: &str| {
            registry
                .register_template_string(&name, source)
                .map_err(|e| TemplateError::Parse {
                    field: name.clone(),
                    message: e.to_string(),
                })
        };

        register(METHOD.to_string(), &config.method)?;
        register(URL.to_string(), &config.url)?;
        register(BODY.to_string(), &config.body)?;
        for (name, value) in &config.headers {
            register(header_key(name), value)?;
        }
        for (name, value) in &config.cookies {
            register(cookie_key(name), value)?;
        }

        Ok(Self {
            registry,
            headers: config.headers.keys().cloned().collect(),
            cookies: config.cookies.keys().cloned().collect(),
        })
    }

    fn render(&self, name: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
        self.registry
            .render(name, ctx)
            .map_err(|e| TemplateError::Render {
                field: name.to_string(),
                message: e.to_string(),
            })
    }
}

impl TemplateEvaluator for RequestTemplate {
    fn execute(&self, ctx: &TemplateContext) -> Result<RequestConfig, TemplateError> {
        let mut headers = BTreeMap::new();
        for name in &self.headers {
            headers.insert(name.clone(), self.render(&header_key(name), ctx)?);
        }

        let mut cookies = BTreeMap::new();
        for name in &self.cookies {
            cookies.insert(name.clone(), self.render(&cookie_key(name), ctx)?);
        }

        Ok(RequestConfig {
            method: self.render(METHOD, ctx)?,
            url: self.render(URL, ctx)?,
            headers,
            cookies,
            body: self.render(BODY, ctx)?,
        })
    }
}

fn header_key(name: &str) -> String {
    format!("header:{name}")
}

fn cookie_key(name: &str) -> String {
    format!("cookie:{name}")
}
