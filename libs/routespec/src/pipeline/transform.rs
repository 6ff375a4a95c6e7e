use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};

/// Pure function applied to a validated response body and its status.
#[derive(Clone)]
pub struct ResponseTransform(Arc<dyn Fn(Value, u16) -> Value + Send + Sync>);

impl ResponseTransform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value, u16) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, body: Value, status: u16) -> Value {
        (self.0)(body, status)
    }

    /// `self`, then `next`.
    pub fn then(self, next: ResponseTransform) -> Self {
        Self::new(move |body, status| next.apply(self.apply(body, status), status))
    }
}

impl fmt::Debug for ResponseTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseTransform")
    }
}

/// Chains transforms in the given order; identity when empty.
pub fn compose(transforms: impl IntoIterator<Item = ResponseTransform>) -> ResponseTransform {
    transforms
        .into_iter()
        .fold(ResponseTransform::new(|body, _| body), ResponseTransform::then)
}

/// Wraps the body as `{success, statusCode, data}`.
pub fn envelope() -> ResponseTransform {
    ResponseTransform::new(|data, status| {
        json!({
            "success": (200..300).contains(&status),
            "statusCode": status,
            "data": data,
        })
    })
}

/// Keeps only the named top-level fields of an object body.
pub fn pick_fields(fields: &[&str]) -> ResponseTransform {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    ResponseTransform::new(move |body, _| match body {
        Value::Object(mut map) => {
            let picked: Map<String, Value> = fields
                .iter()
                .filter_map(|f| map.remove(f).map(|v| (f.clone(), v)))
                .collect();
            Value::Object(picked)
        }
        other => other,
    })
}
