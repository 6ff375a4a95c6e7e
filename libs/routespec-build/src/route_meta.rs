//! Route metadata derived from a route file's location.
//!
//! A route file lives under a routes root and its path encodes everything the
//! router needs: directories become URL segments, `[name]` segments become
//! `{name}` placeholders, `[...name]` swallows the rest of the URL, and a
//! trailing verb token in the file name selects the HTTP method:
//!
//! ```text
//! routes/index.get.rs            GET    /
//! routes/users/[id].patch.rs     PATCH  /users/{id}
//! routes/api/v1/[...catch].rs    GET    /api/v1/{*path}
//! ```

use serde::Serialize;

use crate::error::BuildError;
use crate::method::HttpMethod;

/// Directory name that marks the routes root when none is configured.
pub const DEFAULT_ROOT_MARKER: &str = "routes";

/// Parameter name bound by a catch-all segment.
pub const CATCH_ALL_PARAM: &str = "path";

/// Everything the router and the annotator need to know about one route file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMetadata {
    /// Source identity, kept exactly as given.
    pub file_path: String,
    pub http_method: HttpMethod,
    /// `{name}` placeholders, `{*path}` for a catch-all tail.
    pub url_template: String,
    /// Placeholder names in left-to-right order.
    pub path_parameter_names: Vec<String>,
    pub is_catch_all: bool,
}

impl RouteMetadata {
    /// Derives metadata from a path that is already relative to the routes root.
    pub fn from_relative(path: &str) -> Result<Self, BuildError> {
        let normalized = path.replace('\\', "/");
        derive(path, &normalized)
    }
}

/// Derives metadata from a full file path containing a `<root_marker>/` directory.
///
/// The last occurrence of the marker wins.
pub fn extract_route_metadata(
    file_path: &str,
    root_marker: &str,
) -> Result<RouteMetadata, BuildError> {
    let normalized = file_path.replace('\\', "/");
    let prefix = format!("{root_marker}/");
    let needle = format!("/{prefix}");

    let relative = if let Some(idx) = normalized.rfind(&needle) {
        &normalized[idx + needle.len()..]
    } else if let Some(rest) = normalized.strip_prefix(&prefix) {
        rest
    } else {
        return Err(BuildError::invalid_path(
            file_path,
            format!("no '{root_marker}' directory in path"),
        ));
    };

    derive(file_path, relative)
}

#[derive(Clone, Copy)]
enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    CatchAll,
}

fn derive(file_path: &str, relative: &str) -> Result<RouteMetadata, BuildError> {
    let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let Some((file_name, dirs)) = segments.split_last() else {
        return Err(BuildError::invalid_path(file_path, "empty route path"));
    };

    let (stem, http_method) = split_file_name(file_name);
    if stem.is_empty() {
        return Err(BuildError::invalid_path(file_path, "missing route name"));
    }

    let mut parts: Vec<String> = Vec::with_capacity(segments.len());
    let mut params: Vec<String> = Vec::new();
    let mut is_catch_all = false;

    let stem_segment = (stem != "index").then_some(stem.as_str());
    for raw in dirs.iter().copied().chain(stem_segment) {
        let segment =
            parse_segment(raw).map_err(|reason| BuildError::invalid_path(file_path, reason))?;
        let (placeholder, name) = match segment {
            Segment::Static(s) => {
                parts.push(s.to_string());
                continue;
            }
            Segment::Param(name) => (format!("{{{name}}}"), name),
            Segment::CatchAll => (format!("{{*{CATCH_ALL_PARAM}}}"), CATCH_ALL_PARAM),
        };

        if params.iter().any(|p| p == name) {
            return Err(BuildError::DuplicateParameter {
                path: file_path.to_string(),
                name: name.to_string(),
            });
        }
        params.push(name.to_string());
        parts.push(placeholder);

        if matches!(segment, Segment::CatchAll) {
            // consumes every remaining level
            is_catch_all = true;
            break;
        }
    }

    let url_template = if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    };

    Ok(RouteMetadata {
        file_path: file_path.to_string(),
        http_method,
        url_template,
        path_parameter_names: params,
        is_catch_all,
    })
}

/// Splits `name[.verb][.ext]` into the route stem and its method.
///
/// A final token that is itself a verb is never mistaken for an extension.
fn split_file_name(file_name: &str) -> (String, HttpMethod) {
    // dots inside `[...name]` belong to the segment, not to the suffixes
    let (head, tail) = match file_name.rfind(']') {
        Some(idx) => file_name.split_at(idx + 1),
        None => ("", file_name),
    };

    let tokens: Vec<&str> = tail.split('.').collect();
    let mut end = tokens.len();
    if end > 1 && HttpMethod::from_token(tokens[end - 1]).is_none() {
        end -= 1;
    }

    let mut method = HttpMethod::Get;
    if end > 1 {
        if let Some(m) = HttpMethod::from_token(tokens[end - 1]) {
            method = m;
            end -= 1;
        }
    }

    (format!("{head}{}", tokens[..end].join(".")), method)
}

fn parse_segment(raw: &str) -> Result<Segment<'_>, String> {
    let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        if raw.contains(['[', ']']) {
            return Err(format!("segment '{raw}' mixes literal text and brackets"));
        }
        return Ok(Segment::Static(raw));
    };

    if let Some(name) = inner.strip_prefix("...") {
        check_param_name(name)?;
        return Ok(Segment::CatchAll);
    }
    check_param_name(inner)?;
    Ok(Segment::Param(inner))
}

fn check_param_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty parameter name".to_string());
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("parameter name '{name}' must match [A-Za-z0-9_]+"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str) -> RouteMetadata {
        extract_route_metadata(path, DEFAULT_ROOT_MARKER).unwrap()
    }

    #[test]
    fn index_get_is_root() {
        let m = meta("src/routes/index.get.rs");
        assert_eq!(m.http_method, HttpMethod::Get);
        assert_eq!(m.url_template, "/");
        assert!(m.path_parameter_names.is_empty());
        assert!(!m.is_catch_all);
        assert_eq!(m.file_path, "src/routes/index.get.rs");
    }

    #[test]
    fn patch_with_param_and_no_extension() {
        let m = meta("routes/users/[id].patch");
        assert_eq!(m.http_method, HttpMethod::Patch);
        assert_eq!(m.url_template, "/users/{id}");
        assert_eq!(m.path_parameter_names, vec!["id"]);
    }

    #[test]
    fn extension_is_stripped_before_the_verb() {
        let m = meta("/srv/app/routes/pages/users.post.rs");
        assert_eq!(m.http_method, HttpMethod::Post);
        assert_eq!(m.url_template, "/pages/users");
    }

    #[test]
    fn missing_verb_defaults_to_get() {
        let m = meta("routes/health.rs");
        assert_eq!(m.http_method, HttpMethod::Get);
        assert_eq!(m.url_template, "/health");
    }

    #[test]
    fn nested_index_collapses_without_trailing_slash() {
        let m = meta("routes/pages/index.post.rs");
        assert_eq!(m.url_template, "/pages");
        assert_eq!(m.http_method, HttpMethod::Post);
    }

    #[test]
    fn catch_all_becomes_single_trailing_placeholder() {
        let m = meta("routes/api/v1/[...catch].rs");
        assert!(m.is_catch_all);
        assert_eq!(m.http_method, HttpMethod::Get);
        assert_eq!(m.url_template, "/api/v1/{*path}");
        assert_eq!(m.path_parameter_names, vec!["path"]);
    }

    #[test]
    fn catch_all_directory_consumes_remaining_depth() {
        let m = meta("routes/docs/[...slug]/edit.get.rs");
        assert!(m.is_catch_all);
        assert_eq!(m.url_template, "/docs/{*path}");
    }

    #[test]
    fn multiple_params_keep_order() {
        let m = meta("routes/orgs/[org]/repos/[repo_id].delete.rs");
        assert_eq!(m.http_method, HttpMethod::Delete);
        assert_eq!(m.url_template, "/orgs/{org}/repos/{repo_id}");
        assert_eq!(m.path_parameter_names, vec!["org", "repo_id"]);
    }

    #[test]
    fn windows_separators_are_normalized() {
        let m = meta(r"C:\work\app\routes\users\[id].get.rs");
        assert_eq!(m.url_template, "/users/{id}");
        assert_eq!(m.file_path, r"C:\work\app\routes\users\[id].get.rs");
    }

    #[test]
    fn last_marker_wins() {
        let m = meta("/home/routes/project/src/routes/users.get.rs");
        assert_eq!(m.url_template, "/users");
    }

    #[test]
    fn relative_entry_point() {
        let m = RouteMetadata::from_relative("test/responses/[id].get.rs").unwrap();
        assert_eq!(m.url_template, "/test/responses/{id}");
    }

    #[test]
    fn missing_marker_is_rejected() {
        let err = extract_route_metadata("src/handlers/users.get.rs", "routes").unwrap_err();
        assert!(matches!(err, BuildError::InvalidRoutePath { .. }));
    }

    #[test]
    fn duplicate_params_are_rejected() {
        let err = extract_route_metadata("routes/[id]/items/[id].get.rs", "routes").unwrap_err();
        match err {
            BuildError::DuplicateParameter { name, .. } => assert_eq!(name, "id"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_param_names_are_rejected() {
        for path in [
            "routes/[user-id].get.rs",
            "routes/[].get.rs",
            "routes/user-[id].get.rs",
            "routes/[...].rs",
        ] {
            let err = extract_route_metadata(path, "routes").unwrap_err();
            assert!(
                matches!(err, BuildError::InvalidRoutePath { .. }),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let path = "routes/orgs/[org]/[...rest].get.rs";
        assert_eq!(meta(path), meta(path));
    }

    #[test]
    fn placeholders_match_parameter_names() {
        for path in [
            "routes/index.get.rs",
            "routes/a/[b]/c/[d].put.rs",
            "routes/x/[...y].rs",
            "routes/[only].options",
        ] {
            let m = meta(path);
            let from_template: Vec<String> = m
                .url_template
                .split('/')
                .filter_map(|s| s.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
                .map(|s| s.trim_start_matches('*').to_string())
                .collect();
            assert_eq!(from_template, m.path_parameter_names, "{path}");
        }
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(meta("server/routes/users/[id].patch.rs")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "filePath": "server/routes/users/[id].patch.rs",
                "httpMethod": "PATCH",
                "urlTemplate": "/users/{id}",
                "pathParameterNames": ["id"],
                "isCatchAll": false,
            })
        );
    }
}
