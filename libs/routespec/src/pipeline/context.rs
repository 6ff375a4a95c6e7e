use http::HeaderMap;
use routespec_build::HttpMethod;
use serde_json::{Map, Value};

/// Per-request state shared by middleware and the handler.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: HttpMethod,
    /// Concrete request path, e.g. `/pages/about`.
    pub path: String,
    pub headers: HeaderMap,
    pub request_id: Option<String>,
    /// Peer IP as seen by the HTTP host.
    pub client: Option<String>,
    values: Map<String, Value>,
}

impl RequestContext {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Stores a value for later middleware or the handler.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Key identifying the caller for per-client limits. The connection
    /// address wins over `x-forwarded-for` when the host provides one.
    pub fn client_key(&self) -> String {
        if let Some(client) = &self.client {
            return client.clone();
        }
        self.header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "anonymous".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    #[test]
    fn client_key_prefers_the_connection_address() {
        let mut ctx = RequestContext::new(HttpMethod::Get, "/");
        assert_eq!(ctx.client_key(), "anonymous");

        ctx.headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.0.0.7, 192.168.1.1"),
        );
        assert_eq!(ctx.client_key(), "10.0.0.7");

        ctx.client = Some("127.0.0.1".into());
        assert_eq!(ctx.client_key(), "127.0.0.1");
    }

    #[test]
    fn values_roundtrip() {
        let mut ctx = RequestContext::new(HttpMethod::Post, "/users");
        ctx.insert("user", json!({ "id": 1 }));
        assert_eq!(ctx.get("user"), Some(&json!({ "id": 1 })));
        assert!(ctx.get("missing").is_none());
    }
}
