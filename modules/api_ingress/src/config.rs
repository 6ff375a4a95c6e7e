use routespec::DocumentOptions;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8087";
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// `modules.api_ingress` section of the application config.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiIngressConfig {
    pub bind_addr: String,
    pub enable_docs: bool,
    pub cors_enabled: bool,
    /// Prefix of the document and viewer endpoints; one trailing slash is ignored.
    pub docs_base_url: String,
    pub body_limit_bytes: usize,
    pub docs: DocumentOptions,
}

impl Default for ApiIngressConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            enable_docs: true,
            cors_enabled: false,
            docs_base_url: String::new(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            docs: DocumentOptions::default(),
        }
    }
}

impl ApiIngressConfig {
    /// `docs_base_url` without its trailing slash, always rooted.
    pub fn docs_base(&self) -> String {
        normalize_base(&self.docs_base_url)
    }
}

pub fn normalize_base(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_loses_one_trailing_slash() {
        assert_eq!(normalize_base("/"), "");
        assert_eq!(normalize_base(""), "");
        assert_eq!(normalize_base("/docs/"), "/docs");
        assert_eq!(normalize_base("/docs"), "/docs");
        assert_eq!(normalize_base("api"), "/api");
    }

    #[test]
    fn section_deserializes_with_defaults() {
        let cfg: ApiIngressConfig = serde_json::from_value(serde_json::json!({
            "bind_addr": "0.0.0.0:9000",
            "docs": { "title": "Playground", "openapi": "3.0.0" }
        }))
        .unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert!(cfg.enable_docs);
        assert_eq!(cfg.body_limit_bytes, DEFAULT_BODY_LIMIT_BYTES);
        assert_eq!(cfg.docs.title.as_deref(), Some("Playground"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let res: Result<ApiIngressConfig, _> =
            serde_json::from_value(serde_json::json!({ "bind": "x" }));
        assert!(res.is_err());
    }
}
