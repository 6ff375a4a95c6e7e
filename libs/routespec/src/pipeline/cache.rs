use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::json;

use super::handler::{HandlerInput, HandlerOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub max_age: Duration,
    pub max_entries: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60),
            max_entries: 1024,
        }
    }
}

impl CacheOptions {
    pub fn max_age(max_age: Duration) -> Self {
        Self {
            max_age,
            ..Default::default()
        }
    }
}

/// Key for one handler input: the caller, the concrete path and the validated
/// parameters, encoded as a JSON array so no two inputs share a key.
pub fn cache_key(input: &HandlerInput) -> String {
    json!([
        input.context.client_key(),
        input.context.path,
        input.path,
        input.query,
        input.body,
    ])
    .to_string()
}

/// Successful handler results keyed by request input.
#[derive(Debug)]
pub struct ResponseCache {
    options: CacheOptions,
    entries: DashMap<String, (Instant, HandlerOutput)>,
}

impl ResponseCache {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            options,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<HandlerOutput> {
        if let Some(entry) = self.entries.get(key) {
            let (stored, output) = entry.value();
            if stored.elapsed() < self.options.max_age {
                return Some(output.clone());
            }
        } else {
            return None;
        }
        self.entries.remove(key);
        None
    }

    pub fn insert(&self, key: String, output: HandlerOutput) {
        if self.entries.len() >= self.options.max_entries {
            let max_age = self.options.max_age;
            self.entries.retain(|_, (stored, _)| stored.elapsed() < max_age);
            if self.entries.len() >= self.options.max_entries {
                tracing::debug!(entries = self.entries.len(), "response cache full");
                return;
            }
        }
        self.entries.insert(key, (Instant::now(), output));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::RequestContext;
    use routespec_build::HttpMethod;
    use serde_json::Value;

    fn input(client: &str, query: Value) -> HandlerInput {
        let mut context = RequestContext::new(HttpMethod::Get, "/search");
        context.client = Some(client.to_string());
        HandlerInput {
            context,
            path: json!({}),
            query,
            body: Value::Null,
        }
    }

    #[test]
    fn keys_do_not_collide_on_separators() {
        let a = cache_key(&input("1.1.1.1", json!({ "q": "a|b" })));
        let b = cache_key(&input("1.1.1.1", json!({ "q": "a", "|b": "" })));
        assert_ne!(a, b);
        assert_eq!(a, cache_key(&input("1.1.1.1", json!({ "q": "a|b" }))));
    }

    #[test]
    fn keys_include_the_caller() {
        let q = json!({ "q": "x" });
        assert_ne!(
            cache_key(&input("1.1.1.1", q.clone())),
            cache_key(&input("2.2.2.2", q))
        );
    }

    #[test]
    fn entries_expire() {
        let cache = ResponseCache::new(CacheOptions::max_age(Duration::ZERO));
        cache.insert("k".into(), HandlerOutput::with_status(200, Some(json!(1))));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn fresh_entries_are_returned() {
        let cache = ResponseCache::new(CacheOptions::default());
        cache.insert("k".into(), HandlerOutput::with_status(200, Some(json!(1))));
        assert_eq!(cache.get("k").unwrap().body, Some(json!(1)));
    }

    #[test]
    fn full_cache_drops_new_entries() {
        let cache = ResponseCache::new(CacheOptions {
            max_age: Duration::from_secs(60),
            max_entries: 1,
        });
        cache.insert("a".into(), HandlerOutput::no_content());
        cache.insert("b".into(), HandlerOutput::no_content());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b").is_none());
    }
}
