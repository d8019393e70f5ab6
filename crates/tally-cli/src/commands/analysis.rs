//! Model-backed analysis commands

use std::path::Path;

use anyhow::{Context, Result};

use tally_core::{CategoryTotals, StatementAnalyzer, StatementReport};

use super::load_statement;
use super::statements::format_summary;

pub async fn cmd_categorize(
    analyzer: &StatementAnalyzer,
    file: &Path,
    format: Option<&str>,
    model: Option<&str>,
) -> Result<()> {
    let transactions = load_statement(file, format)?;
    let answered = analyzer
        .categorize(&transactions, model)
        .await
        .context("Categorization failed")?;

    println!(
        "🏷️  Categories ({} via {})\n",
        answered.model, answered.provider
    );
    print!("{}", format_categories(&answered.value));
    Ok(())
}

pub async fn cmd_analyze(
    analyzer: &StatementAnalyzer,
    file: &Path,
    format: Option<&str>,
    model: Option<&str>,
    json: bool,
) -> Result<()> {
    let transactions = load_statement(file, format)?;
    let report = analyzer
        .analyze(&transactions, model)
        .await
        .context("Analysis failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_report(&report));
    }
    Ok(())
}

/// Categories sorted by total, largest first
pub fn format_categories(categories: &CategoryTotals) -> String {
    let mut rows: Vec<_> = categories.iter().collect();
    rows.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));

    rows.iter()
        .map(|(name, total)| format!("   {:<24} ${:>10.2}\n", name, total))
        .collect()
}

pub fn format_report(report: &StatementReport) -> String {
    let mut out = format_summary(&report.summary);

    out.push_str(&format!("\n🏷️  Categories ({})\n", report.categorized_by));
    out.push_str(&format_categories(&report.categories));

    out.push_str(&format!("\n💡 Advice ({})\n", report.advised_by));
    for line in report.advice.lines().filter(|l| !l.trim().is_empty()) {
        out.push_str(&format!("   {}\n", line.trim()));
    }

    out.push_str("\n💰 Savings matrix\n");
    out.push_str(&format!(
        "   {:<14} {:>12} {:>12} {:>8}\n",
        "Strategy", "Monthly", "Annual", "ROI %"
    ));
    for (name, strategy) in &report.savings_matrix {
        out.push_str(&format!(
            "   {:<14} {:>12.2} {:>12.2} {:>8.1}\n",
            name, strategy.monthly_savings, strategy.annual_savings, strategy.roi_projection
        ));
    }
    out
}
