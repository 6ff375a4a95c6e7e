use std::collections::HashSet;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use routespec_build::{BuildTransform, TransformedFile};

const ROUTES_DIR: &str = "src/routes";

fn main() -> Result<()> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let routes_root = manifest_dir.join(ROUTES_DIR);
    println!("cargo:rerun-if-changed={ROUTES_DIR}");

    let transform = BuildTransform::new(&routes_root);
    let report = transform
        .transform_tree(out_dir.join("routes"))
        .context("failed to annotate route files")?;

    for skipped in &report.skipped {
        println!(
            "cargo:warning=skipped {} ({:?})",
            skipped.path.display(),
            skipped.reason
        );
    }

    let index = render_index(&routes_root, &report.transformed)?;
    fs::write(out_dir.join("routes_index.rs"), index).context("failed to write route index")?;
    Ok(())
}

/// One module per annotated route file plus `register_routes`, which
/// declares them in file order.
fn render_index(routes_root: &Path, files: &[TransformedFile]) -> Result<String> {
    let mut modules = String::new();
    let mut calls = String::new();
    let mut listing = String::new();
    let mut taken = HashSet::new();

    for file in files {
        let relative = file
            .source
            .strip_prefix(routes_root)
            .with_context(|| format!("{} is outside the routes root", file.source.display()))?
            .to_string_lossy()
            .replace('\\', "/");
        let name = unique_ident(&relative, &mut taken);

        writeln!(
            modules,
            "pub mod {name} {{\n    include!({:?});\n}}\n",
            file.output.to_string_lossy()
        )?;
        writeln!(calls, "        {name}::route(registry)?,")?;
        writeln!(
            listing,
            "    ({:?}, {:?}, {:?}),",
            relative,
            file.metadata.http_method.as_str(),
            file.metadata.url_template
        )?;
    }

    Ok(format!(
        "// @generated by build.rs from {ROUTES_DIR}\n\n\
         {modules}\
         /// Route files as `(relative path, method, URL template)`.\n\
         pub const ROUTE_FILES: &[(&str, &str, &str)] = &[\n{listing}];\n\n\
         pub fn register_routes(\n    registry: &mut routespec::Registry,\n) -> anyhow::Result<Vec<routespec::Pipeline>> {{\n    Ok(vec![\n{calls}    ])\n}}\n"
    ))
}

fn unique_ident(relative: &str, taken: &mut HashSet<String>) -> String {
    let stem = relative.strip_suffix(".rs").unwrap_or(relative);
    let mut ident = String::from("route");
    let mut gap = true;
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            if gap {
                ident.push('_');
                gap = false;
            }
            ident.push(c.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }

    let mut candidate = ident.clone();
    let mut n = 2;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{ident}_{n}");
        n += 1;
    }
    candidate
}
