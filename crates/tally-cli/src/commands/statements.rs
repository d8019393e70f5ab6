//! Offline statement commands

use std::path::Path;

use anyhow::Result;

use tally_core::{summarize, Transaction, TransactionSummary};

use super::{load_statement, truncate};

pub fn cmd_parse(file: &Path, format: Option<&str>) -> Result<()> {
    let transactions = load_statement(file, format)?;
    print!("{}", format_transactions_table(&transactions));
    println!("\n{} transactions", transactions.len());
    Ok(())
}

pub fn cmd_summary(file: &Path, format: Option<&str>) -> Result<()> {
    let transactions = load_statement(file, format)?;
    print!("{}", format_summary(&summarize(&transactions)));
    Ok(())
}

pub fn format_transactions_table(transactions: &[Transaction]) -> String {
    let mut out = format!(
        "{:<12} {:<40} {:>12}  {}\n",
        "Date", "Description", "Amount", "Type"
    );
    out.push_str(&format!("{}\n", "-".repeat(74)));
    for tx in transactions {
        out.push_str(&format!(
            "{:<12} {:<40} {:>12.2}  {}\n",
            tx.date.to_string(),
            truncate(&tx.description, 40),
            tx.amount,
            tx.kind
        ));
    }
    out
}

pub fn format_summary(summary: &TransactionSummary) -> String {
    format!(
        "📊 Statement summary\n\
         \x20  Transactions: {}\n\
         \x20  Debits:       {:>4}  ${:.2}\n\
         \x20  Credits:      {:>4}  ${:.2}\n\
         \x20  Net:                ${:.2}\n",
        summary.total_transactions,
        summary.debits.count,
        summary.debits.total_amount,
        summary.credits.count,
        summary.credits.total_amount,
        summary.net()
    )
}
