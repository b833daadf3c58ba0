use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{AnalysisOutcome, ManifestDescriptor, PipelineResult, RunStatus};

/// Render a colored terminal report.
pub fn render(result: &PipelineResult, verbose: bool, quiet: bool) -> Result<()> {
    let total = result.outcomes.len();
    let failed = result.failure_count();
    let succeeded = total - failed;

    if quiet {
        println!(
            "Status: {}  Manifests: {}  Succeeded: {}  Failed: {}",
            result.status,
            total,
            succeeded.to_string().green(),
            failed.to_string().red(),
        );
        return Ok(());
    }

    println!("\n {} v{}", "stack-scout".bold(), env!("CARGO_PKG_VERSION"));
    if let Some(image) = &result.image {
        println!(" Image     : {}", image);
        let base_os = result
            .image_facts
            .as_ref()
            .and_then(|f| f.base_os.as_deref())
            .unwrap_or("unknown");
        println!(" Base OS   : {}", base_os);
    }
    println!(
        " Repository: {}\n",
        result.repository_url.as_deref().unwrap_or("-")
    );

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Status             : {}", status_label(result.status)));
    println!(" │  {:<48} │", format!("Manifests analyzed : {}", total));
    println!(
        " │  {:<48} │",
        format!("{}  Succeeded       : {:>4}", "✓".green(), succeeded)
    );
    println!(
        " │  {:<48} │",
        format!("{}  Failed          : {:>4}", "✗".red(), failed)
    );
    println!(" └────────────────────────────────────────────────────┘\n");

    if let Some(reason) = &result.repository_error {
        println!(
            " {} Repository could not be resolved: {}\n",
            "[ERROR]".red().bold(),
            reason
        );
    }

    if failed > 0 {
        println!(" {} Manifests that failed analysis:\n", "[FAIL]".red().bold());
        render_table(&result.outcomes, false);
        println!();
    }

    if verbose && succeeded > 0 {
        println!(" {} Manifests submitted:\n", "[OK]".green().bold());
        render_table(&result.outcomes, true);
        println!();
    }

    Ok(())
}

fn status_label(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Completed => status.to_string().green(),
        RunStatus::Cancelled => status.to_string().yellow(),
    }
}

fn render_table(outcomes: &[AnalysisOutcome], successes: bool) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Manifest").add_attribute(Attribute::Bold),
            Cell::new("Outcome").add_attribute(Attribute::Bold),
            Cell::new("Detail").add_attribute(Attribute::Bold),
        ]);

    for outcome in outcomes.iter().filter(|o| o.is_success() == successes) {
        let (label, color, detail) = match outcome {
            AnalysisOutcome::Success { response, .. } => {
                ("✓ submitted", Color::Green, response_summary(response))
            }
            AnalysisOutcome::Failure { reason, .. } => ("✗ failed", Color::Red, reason.to_string()),
        };

        table.add_row(vec![
            Cell::new(manifest_path(outcome.descriptor())),
            Cell::new(label)
                .fg(color)
                .set_alignment(CellAlignment::Center),
            Cell::new(detail),
        ]);
    }

    println!("{}", table);
}

fn manifest_path(descriptor: &ManifestDescriptor) -> String {
    if descriptor.dirpath.is_empty() {
        descriptor.filename.clone()
    } else {
        format!("{}/{}", descriptor.dirpath, descriptor.filename)
    }
}

/// A short identifier for a stack-analysis response.
fn response_summary(response: &serde_json::Value) -> String {
    ["request_id", "id", "status"]
        .iter()
        .find_map(|key| response.get(*key))
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
        .unwrap_or_else(|| "accepted".to_string())
}
