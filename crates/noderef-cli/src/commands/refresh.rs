use miette::{IntoDiagnostic, Result};
use noderef_core::config::RefreshConfig;
use noderef_core::refresh::{self, CatalogSummary, RefreshSummary};
use noderef_core::Config;
use serde::Serialize;
use std::io::{self, Write};
use tracing::info;

/// JSON result for `noderef --json`.
#[derive(Serialize)]
struct RefreshJsonResult<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a RefreshSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run a full refresh and report it.
///
/// Exits with status 1 if the refresh fails; the previous cache is kept.
pub fn run(config: &Config, settings: &RefreshConfig, json: bool) -> Result<()> {
    info!(cwd = %config.cwd.display(), out = %settings.out_dir.display(), "Refreshing node registry");

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = runtime.block_on(refresh::run(settings));

    match result {
        Ok(summary) => {
            if json {
                print_json(&RefreshJsonResult {
                    ok: true,
                    summary: Some(&summary),
                    error: None,
                })?;
            } else {
                print_human(&summary).into_diagnostic()?;
            }
            Ok(())
        }
        Err(e) => {
            if json {
                print_json(&RefreshJsonResult {
                    ok: false,
                    summary: None,
                    error: Some(e.to_string()),
                })?;
            } else {
                eprintln!("error: {e}");
                eprintln!("hint: the previous cache in {} was left untouched", settings.out_dir.display());
            }
            std::process::exit(1);
        }
    }
}

fn print_json(result: &RefreshJsonResult<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(result).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

fn print_human(summary: &RefreshSummary) -> io::Result<()> {
    let mut out = io::stdout().lock();

    catalog_line(&mut out, "Official", &summary.official)?;
    catalog_line(&mut out, "Community", &summary.community)?;

    let o = &summary.overrides;
    writeln!(
        out,
        "Overrides: {} ({} dynamic, {} static)",
        o.total, o.dynamic, o.static_count
    )?;
    if o.downgrades_refused > 0 {
        writeln!(out, "  {} downgrade(s) refused", o.downgrades_refused)?;
    }
    for pkg in &summary.packages {
        match &pkg.error {
            Some(error) => writeln!(out, "  {}: unavailable ({error})", pkg.package)?,
            None => writeln!(
                out,
                "  {}: {} files, {} dynamic, {} static, {} failed, {} duplicate",
                pkg.package, pkg.files, pkg.dynamic, pkg.static_count, pkg.failed, pkg.duplicates
            )?,
        }
    }

    writeln!(out, "Property records: {}", summary.property_records)?;
    if summary.malformed_schemas > 0 {
        writeln!(out, "  {} malformed schema(s) skipped", summary.malformed_schemas)?;
    }

    writeln!(out, "Artifacts in {}:", summary.out_dir.display())?;
    for artifact in &summary.artifacts {
        let name = artifact
            .path
            .file_name()
            .map_or_else(|| artifact.path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let state = if artifact.changed { "updated" } else { "unchanged" };
        writeln!(out, "  {name} ({} bytes, {state})", artifact.bytes)?;
    }
    Ok(())
}

fn catalog_line(out: &mut impl Write, label: &str, catalog: &CatalogSummary) -> io::Result<()> {
    write!(out, "{label}: {} nodes", catalog.written)?;
    if catalog.dropped > 0 {
        write!(out, " ({} without a name dropped)", catalog.dropped)?;
    }
    writeln!(out, " from {} ({} page(s))", catalog.source, catalog.pages)
}
