//! Request middleware: small decorators run before validation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;

use super::context::RequestContext;
use crate::api::HttpError;

#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Name reported when the middleware fails.
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), HttpError>;
}

pub type MiddlewareRef = Arc<dyn Middleware>;

struct FnMiddleware<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut RequestContext) -> Result<(), HttpError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), HttpError> {
        (self.f)(ctx)
    }
}

/// Middleware from a synchronous function.
pub fn middleware_fn<F>(name: impl Into<String>, f: F) -> MiddlewareRef
where
    F: Fn(&mut RequestContext) -> Result<(), HttpError> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware {
        name: name.into(),
        f,
    })
}

/// Rejects requests whose key header is missing or unknown with 401.
pub struct ApiKeyAuth {
    header: String,
    keys: HashSet<String>,
}

impl ApiKeyAuth {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: "x-api-key".to_string(),
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }
}

#[async_trait]
impl Middleware for ApiKeyAuth {
    fn name(&self) -> &str {
        "api-key-auth"
    }

    fn description(&self) -> Option<&str> {
        Some("Requires a known API key header")
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), HttpError> {
        match ctx.header(&self.header) {
            Some(key) if self.keys.contains(key) => {
                ctx.insert("authenticated", json!(true));
                Ok(())
            }
            _ => Err(HttpError::unauthorized()),
        }
    }
}

/// Fixed-window request limit per client key.
pub struct RateLimit {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, (Instant, u32)>,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }

    /// Counts one request; `Err(retry_after)` once the window is exhausted.
    fn hit(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut entry = self.windows.entry(key.to_string()).or_insert((now, 0));
        let (started, count) = entry.value_mut();
        if now.duration_since(*started) >= self.window {
            *started = now;
            *count = 0;
        }
        if *count >= self.max_requests {
            return Err(self.window.saturating_sub(now.duration_since(*started)));
        }
        *count += 1;
        Ok(())
    }
}

#[async_trait]
impl Middleware for RateLimit {
    fn name(&self) -> &str {
        "rate-limit"
    }

    fn description(&self) -> Option<&str> {
        Some("Fixed window request limit per client")
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), HttpError> {
        let key = ctx.client_key();
        self.hit(&key, Instant::now()).map_err(|retry_after| {
            tracing::debug!(client = %key, "rate limit exceeded");
            HttpError::too_many_requests()
                .with_data(json!({ "retryAfter": retry_after.as_secs().max(1) }))
        })
    }
}
