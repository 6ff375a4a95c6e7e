//! Build-time injection of route metadata into a route module's source.
//!
//! A route module declares itself with a single call such as
//!
//! ```text
//! define_meta(registry, RouteMeta {
//!     summary: Some("Show a page".into()),
//!     ..RouteMeta::default()
//! })
//! ```
//!
//! The annotator finds that call and adds `__path` and `__method` fields to
//! its struct literal. Text is spliced at the positions reported by the parser,
//! everything else in the file is kept byte for byte. Running it on its own
//! output replaces the injected values in place, so the result is stable.

mod locate;
mod source_map;

use std::ops::Range;

use proc_macro2::{LineColumn, Literal};
use syn::visit::Visit;

use crate::error::BuildError;
use crate::route_meta::RouteMetadata;
use locate::{DeclarationFinder, DeclarationSite};

pub use source_map::{MappedEdit, SourceMap};

pub const DEFAULT_CALLEE: &str = "define_meta";
pub const PATH_FIELD: &str = "__path";
pub const METHOD_FIELD: &str = "__method";

#[derive(Debug, Clone)]
pub struct AnnotateOptions {
    /// Last path segment of the declaration function.
    pub callee: String,
    pub source_map: bool,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            callee: DEFAULT_CALLEE.to_string(),
            source_map: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotated {
    pub code: String,
    /// False when the source was passed through untouched.
    pub changed: bool,
    pub source_map: Option<SourceMap>,
}

/// Annotates `source` with the default options.
pub fn annotate(source: &str, meta: &RouteMetadata) -> Result<Annotated, BuildError> {
    annotate_with(source, meta, &AnnotateOptions::default())
}

pub fn annotate_with(
    source: &str,
    meta: &RouteMetadata,
    options: &AnnotateOptions,
) -> Result<Annotated, BuildError> {
    let base = preamble_len(source);
    let body = &source[base..];

    let file: syn::File = syn::parse_str(body).map_err(|err| {
        let at = err.span().start();
        BuildError::ParseError {
            message: err.to_string(),
            line: at.line,
            column: at.column + 1,
        }
    })?;

    let mut finder = DeclarationFinder::new(&options.callee);
    finder.visit_file(&file);

    let site = match finder.sites.len() {
        0 => {
            if finder.bare_calls > 0 {
                tracing::debug!(
                    file = %meta.file_path,
                    callee = %options.callee,
                    "declaration call without a struct literal, leaving source unchanged"
                );
            }
            return Ok(Annotated {
                code: source.to_string(),
                changed: false,
                source_map: options.source_map.then(SourceMap::default),
            });
        }
        1 => &finder.sites[0],
        count => {
            return Err(BuildError::AmbiguousDeclaration {
                callee: options.callee.clone(),
                count,
            })
        }
    };

    let index = LineIndex::new(body);
    let mut edits = plan_edits(site, &index, meta);
    for edit in &mut edits {
        edit.range = edit.range.start + base..edit.range.end + base;
    }
    edits.sort_by_key(|e| e.range.start);

    let (code, mapped) = apply(source, &edits);
    Ok(Annotated {
        changed: code != source,
        code,
        source_map: options.source_map.then(|| SourceMap::new(mapped)),
    })
}

#[derive(Debug)]
struct Edit {
    range: Range<usize>,
    text: String,
}

fn plan_edits(site: &DeclarationSite, index: &LineIndex<'_>, meta: &RouteMetadata) -> Vec<Edit> {
    let wanted = [
        (PATH_FIELD, Literal::string(&meta.url_template).to_string()),
        (METHOD_FIELD, Literal::string(meta.http_method.as_str()).to_string()),
    ];

    let mut edits = Vec::new();
    let mut missing = Vec::new();
    for (name, literal) in wanted {
        let existing = site
            .fields
            .iter()
            .find(|f| f.name.as_deref() == Some(name));
        match existing {
            Some(field) if field.shorthand => edits.push(Edit {
                range: index.offset(field.start)..index.offset(field.end),
                text: format!("{name}: {literal}"),
            }),
            Some(field) => {
                let range = index.offset(field.value_start)..index.offset(field.end);
                if index.src[range.clone()] != literal {
                    edits.push(Edit {
                        range,
                        text: literal,
                    });
                }
            }
            None => missing.push(format!("{name}: {literal}")),
        }
    }

    if !missing.is_empty() {
        edits.push(insertion(site, index, &missing));
    }
    edits
}

fn insertion(site: &DeclarationSite, index: &LineIndex<'_>, fields: &[String]) -> Edit {
    let multiline = site.is_multiline();

    if let Some(rest) = site.rest {
        // before `..base`
        let at = index.offset(rest);
        let sep = if multiline {
            format!("\n{}", index.indent_at(at))
        } else {
            " ".to_string()
        };
        let text = fields.iter().map(|f| format!("{f},{sep}")).collect();
        return Edit { range: at..at, text };
    }

    if let Some(last) = site.fields.last() {
        // after the last value, ahead of any trailing comma
        let at = index.offset(last.end);
        let sep = if multiline {
            format!("\n{}", index.indent_at(index.offset(last.start)))
        } else {
            " ".to_string()
        };
        let text = fields.iter().map(|f| format!(",{sep}{f}")).collect();
        return Edit { range: at..at, text };
    }

    let at = index.offset(site.close);
    let text = if multiline {
        let indent = index.indent_at(at);
        fields
            .iter()
            .map(|f| format!("    {f},\n{indent}"))
            .collect()
    } else {
        format!(" {} ", fields.join(", "))
    };
    Edit { range: at..at, text }
}

fn apply(source: &str, edits: &[Edit]) -> (String, Vec<MappedEdit>) {
    let growth: usize = edits.iter().map(|e| e.text.len()).sum();
    let mut out = String::with_capacity(source.len() + growth);
    let mut mapped = Vec::with_capacity(edits.len());
    let mut cursor = 0;

    for edit in edits {
        out.push_str(&source[cursor..edit.range.start]);
        let start = out.len();
        out.push_str(&edit.text);
        mapped.push(MappedEdit {
            original: edit.range.clone(),
            generated: start..out.len(),
        });
        cursor = edit.range.end;
    }
    out.push_str(&source[cursor..]);
    (out, mapped)
}

/// Bytes ahead of the parseable body: a BOM and a `#!` interpreter line.
fn preamble_len(source: &str) -> usize {
    let mut len = 0;
    if source.starts_with('\u{feff}') {
        len = '\u{feff}'.len_utf8();
    }
    let rest = &source[len..];
    if let Some(after) = rest.strip_prefix("#!") {
        if !after.trim_start().starts_with('[') {
            len += rest.find('\n').unwrap_or(rest.len());
        }
    }
    len
}

/// Converts parser line/column positions (1-based lines, columns in chars)
/// into byte offsets.
struct LineIndex<'a> {
    src: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(src: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { src, starts }
    }

    fn offset(&self, at: LineColumn) -> usize {
        let Some(&line_start) = self.starts.get(at.line.saturating_sub(1)) else {
            return self.src.len();
        };
        self.src[line_start..]
            .char_indices()
            .nth(at.column)
            .map_or(self.src.len(), |(i, _)| line_start + i)
    }

    fn indent_at(&self, offset: usize) -> &'a str {
        let line_start = self.src[..offset].rfind('\n').map_or(0, |i| i + 1);
        let line = &self.src[line_start..];
        let width = line.len() - line.trim_start_matches([' ', '\t']).len();
        &line[..width]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route_meta::extract_route_metadata;

    fn meta(path: &str) -> RouteMetadata {
        extract_route_metadata(path, "routes").unwrap()
    }

    const MULTILINE: &str = r#"use routespec::prelude::*;

pub fn route(registry: &mut Registry) -> anyhow::Result<Pipeline> {
    let def = define_meta(
        registry,
        RouteMeta {
            summary: Some("Show a page".into()),
            ..RouteMeta::default()
        },
    )?;
    Ok(def.define_event_handler(handler_fn(show)))
}
"#;

    #[test]
    fn injects_before_struct_base() {
        let out = annotate(MULTILINE, &meta("routes/pages/[page].get.rs")).unwrap();
        assert!(out.changed);
        let expected = MULTILINE.replace(
            "            ..RouteMeta::default()",
            "            __path: \"/pages/{page}\",\n            __method: \"GET\",\n            ..RouteMeta::default()",
        );
        assert_eq!(out.code, expected);
    }

    #[test]
    fn annotating_twice_is_stable() {
        let m = meta("routes/users/[id].patch.rs");
        let once = annotate(MULTILINE, &m).unwrap();
        let twice = annotate(&once.code, &m).unwrap();
        assert_eq!(once.code, twice.code);
        assert!(!twice.changed);
    }

    #[test]
    fn stale_values_are_replaced_in_place() {
        let stale = MULTILINE.replace(
            "..RouteMeta::default()",
            "__path: \"/old\",\n            ..RouteMeta::default()",
        );
        let out = annotate(&stale, &meta("routes/new.post.rs")).unwrap();
        assert!(out.code.contains("__path: \"/new\","));
        assert!(!out.code.contains("/old"));
        assert_eq!(out.code.matches("__path").count(), 1);
        assert!(out.code.contains("__method: \"POST\""));
    }

    #[test]
    fn appends_after_last_field_inline() {
        let src = "fn r(reg: &mut Registry) { define_meta(reg, RouteMeta { summary: None }); }";
        let out = annotate(src, &meta("routes/index.get.rs")).unwrap();
        assert_eq!(
            out.code,
            "fn r(reg: &mut Registry) { define_meta(reg, RouteMeta { summary: None, __path: \"/\", __method: \"GET\" }); }"
        );
    }

    #[test]
    fn keeps_trailing_comma_after_injected_fields() {
        let src = "fn r(reg: &mut Registry) {\n    define_meta(reg, RouteMeta {\n        summary: None,\n    });\n}\n";
        let out = annotate(src, &meta("routes/a.delete.rs")).unwrap();
        assert_eq!(
            out.code,
            "fn r(reg: &mut Registry) {\n    define_meta(reg, RouteMeta {\n        summary: None,\n        __path: \"/a\",\n        __method: \"DELETE\",\n    });\n}\n"
        );
    }

    #[test]
    fn fills_empty_literal() {
        let src = "fn r(reg: &mut Registry) { routespec::define_meta(reg, Meta {}); }";
        let out = annotate(src, &meta("routes/x.get.rs")).unwrap();
        assert!(out
            .code
            .contains("Meta { __path: \"/x\", __method: \"GET\" }"));
    }

    #[test]
    fn shorthand_field_is_expanded() {
        let src = "fn r(reg: &mut Registry, __path: &'static str) { define_meta(reg, RouteMeta { __path, ..Default::default() }); }";
        let out = annotate(src, &meta("routes/y.get.rs")).unwrap();
        assert!(out.code.contains("RouteMeta { __path: \"/y\", __method: \"GET\", ..Default::default() }"));
    }

    #[test]
    fn passes_through_without_declaration() {
        let src = "// nothing to see\nfn helper() -> u8 { 1 }\n";
        let out = annotate(src, &meta("routes/z.get.rs")).unwrap();
        assert!(!out.changed);
        assert_eq!(out.code, src);
    }

    #[test]
    fn call_without_literal_is_left_alone() {
        let src = "fn r(reg: &mut Registry, m: RouteMeta) { define_meta(reg, m); }";
        let out = annotate(src, &meta("routes/z.get.rs")).unwrap();
        assert_eq!(out.code, src);
    }

    #[test]
    fn two_declarations_are_ambiguous() {
        let src = "fn r(reg: &mut Registry) { define_meta(reg, RouteMeta {}); define_meta(reg, RouteMeta {}); }";
        let err = annotate(src, &meta("routes/z.get.rs")).unwrap_err();
        assert!(matches!(
            err,
            BuildError::AmbiguousDeclaration { count: 2, .. }
        ));
    }

    #[test]
    fn invalid_source_is_a_parse_error() {
        let err = annotate("fn broken( {", &meta("routes/z.get.rs")).unwrap_err();
        assert!(matches!(err, BuildError::ParseError { .. }));
    }

    #[test]
    fn multibyte_text_before_the_call_keeps_offsets() {
        let src = "const GREETING: &str = \"héllo wörld\"; fn r(reg: &mut Registry) { define_meta(reg, RouteMeta { title: Some(\"ünï\") }); }";
        let out = annotate(src, &meta("routes/u.get.rs")).unwrap();
        assert!(out
            .code
            .contains("RouteMeta { title: Some(\"ünï\"), __path: \"/u\", __method: \"GET\" }"));
    }

    #[test]
    fn method_call_form_is_recognized() {
        let src = "fn r(reg: &mut Registry) { reg.define_meta(RouteMeta { title: None }); }";
        let out = annotate(src, &meta("routes/m.put.rs")).unwrap();
        assert!(out.code.contains("__method: \"PUT\""));
    }

    #[test]
    fn source_map_points_back_to_the_original() {
        let src = "fn r(reg: &mut Registry) { define_meta(reg, RouteMeta { title: None }); }";
        let options = AnnotateOptions {
            source_map: true,
            ..AnnotateOptions::default()
        };
        let out = annotate_with(src, &meta("routes/s.get.rs"), &options).unwrap();
        let map = out.source_map.unwrap();
        assert_eq!(map.edits().len(), 1);

        let closing = out.code.rfind('}').unwrap();
        assert_eq!(map.original_offset(closing), src.rfind('}').unwrap());
    }

    #[test]
    fn shebang_and_bom_do_not_shift_positions() {
        let src = "\u{feff}#!/usr/bin/env run-cargo-script\nfn r(reg: &mut Registry) { define_meta(reg, RouteMeta { title: None }); }\n";
        let out = annotate(src, &meta("routes/b.get.rs")).unwrap();
        assert!(out.code.starts_with("\u{feff}#!/usr/bin/env run-cargo-script\n"));
        assert!(out.code.contains("RouteMeta { title: None, __path: \"/b\", __method: \"GET\" }"));
    }
}
