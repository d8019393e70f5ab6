//! Bank statement import
//!
//! Two input shapes are supported:
//! - CSV exports, with columns located by header name
//! - plain statement text (e.g. text pulled out of a PDF), scanned line by line

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{KindTotals, Transaction, TransactionKind, TransactionSummary};

const DATE_HEADERS: &[&str] = &["date", "transaction date", "posting date", "post date"];
const DESCRIPTION_HEADERS: &[&str] = &["description", "merchant", "narrative", "details", "memo"];
const AMOUNT_HEADERS: &[&str] = &["amount", "transaction amount", "value"];
const TYPE_HEADERS: &[&str] = &["type", "transaction type"];
const DEBIT_HEADERS: &[&str] = &["debit", "withdrawals", "money out"];
const CREDIT_HEADERS: &[&str] = &["credit", "deposits", "money in"];

/// One statement line: date, description, amount, optional CR/DR marker
const STATEMENT_LINE: &str = r"^\s*(?P<date>\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}[/-]\d{2,4})[\s,|]+(?P<description>.*?[A-Za-z].*?)[\s,|]+(?P<amount>\(?-?\$?[\d,]+\.\d{2}\)?)(?:\s+(?P<marker>CR|DR|cr|dr))?\s*$";

/// Input format for `parse_statement`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementFormat {
    Csv,
    Text,
}

impl StatementFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Text => "text",
        }
    }

    /// Guess the format from a file name (`.csv` is CSV, anything else text)
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Text,
        }
    }
}

impl fmt::Display for StatementFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "text" | "txt" | "pdf" => Ok(Self::Text),
            other => Err(Error::InvalidData(format!("Unknown statement format: {}", other))),
        }
    }
}

/// Parse statement content in the given format
pub fn parse_statement(format: StatementFormat, content: &str) -> Result<Vec<Transaction>> {
    match format {
        StatementFormat::Csv => parse_csv(content.as_bytes()),
        StatementFormat::Text => extract_from_text(content),
    }
}

/// Column positions resolved from the CSV header row
#[derive(Debug)]
struct Columns {
    date: usize,
    description: usize,
    amount: Option<usize>,
    kind: Option<usize>,
    debit: Option<usize>,
    credit: Option<usize>,
}

impl Columns {
    fn detect(headers: &StringRecord) -> Result<Self> {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
        };

        let columns = Self {
            date: find(DATE_HEADERS)
                .ok_or_else(|| Error::Import("CSV has no date column".into()))?,
            description: find(DESCRIPTION_HEADERS)
                .ok_or_else(|| Error::Import("CSV has no description column".into()))?,
            amount: find(AMOUNT_HEADERS),
            kind: find(TYPE_HEADERS),
            debit: find(DEBIT_HEADERS),
            credit: find(CREDIT_HEADERS),
        };

        if columns.amount.is_none() && columns.debit.is_none() && columns.credit.is_none() {
            return Err(Error::Import("CSV has no amount column".into()));
        }
        Ok(columns)
    }

    /// Signed amount for a row (negative = money out), None when blank
    fn signed_amount(&self, record: &StringRecord) -> Result<Option<f64>> {
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        if let Some(amount) = field(self.amount) {
            return parse_amount(amount).map(Some);
        }

        let debit = field(self.debit).map(parse_amount).transpose()?;
        let credit = field(self.credit).map(parse_amount).transpose()?;
        Ok(match (debit, credit) {
            (None, None) => None,
            (debit, credit) => Some(credit.unwrap_or(0.0).abs() - debit.unwrap_or(0.0).abs()),
        })
    }
}

/// Parse a CSV export into transactions
///
/// Rows without a date or amount are skipped; a present but unparseable
/// value is an import error.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns = Columns::detect(&headers)?;
    debug!(?columns, "Detected CSV columns");

    let mut transactions = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result?;

        let date_str = record.get(columns.date).map(str::trim).unwrap_or_default();
        if date_str.is_empty() {
            debug!(row, "Skipping row without date");
            continue;
        }
        let date = parse_date(date_str)?;

        let description = record.get(columns.description).unwrap_or_default();

        let Some(amount) = columns.signed_amount(&record)? else {
            debug!(row, "Skipping row without amount");
            continue;
        };

        let declared_kind = columns
            .kind
            .and_then(|i| record.get(i))
            .and_then(|s| s.parse::<TransactionKind>().ok());

        let transaction = match declared_kind {
            Some(kind) => Transaction::new(date, description, amount, kind),
            None => Transaction::from_signed(date, description, amount),
        };
        transactions.push(transaction);
    }

    debug!(count = transactions.len(), "Parsed CSV statement");
    Ok(transactions)
}

/// Scan statement text for `date description amount` lines
///
/// A trailing `CR`/`DR` marker sets the direction; otherwise the amount's
/// sign does. Lines that do not look like transactions are ignored.
pub fn extract_from_text(text: &str) -> Result<Vec<Transaction>> {
    let line_re = Regex::new(STATEMENT_LINE)?;
    let mut transactions = Vec::new();

    for line in text.lines() {
        let Some(caps) = line_re.captures(line) else {
            continue;
        };

        let Ok(date) = parse_date(&caps["date"]) else {
            debug!(line, "Skipping line with unparseable date");
            continue;
        };
        let amount = parse_amount(&caps["amount"])?;
        let description = caps["description"].trim();

        let transaction = match caps.name("marker").map(|m| m.as_str()) {
            Some(marker) => Transaction::new(date, description, amount, marker.parse()?),
            None => Transaction::from_signed(date, description, amount),
        };
        transactions.push(transaction);
    }

    debug!(count = transactions.len(), "Extracted transactions from text");
    Ok(transactions)
}

/// Count and total debits and credits
pub fn summarize(transactions: &[Transaction]) -> TransactionSummary {
    let mut debits = KindTotals::default();
    let mut credits = KindTotals::default();

    for tx in transactions {
        let totals = match tx.kind {
            TransactionKind::Debit => &mut debits,
            TransactionKind::Credit => &mut credits,
        };
        totals.count += 1;
        totals.total_amount += tx.amount;
    }

    debits.total_amount = round_cents(debits.total_amount);
    credits.total_amount = round_cents(credits.total_amount);

    TransactionSummary {
        total_transactions: transactions.len(),
        debits,
        credits,
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse a statement date into a calendar date
///
/// The format is chosen by the shape of the year field, since chrono's `%Y`
/// also accepts two digits and would read `01/15/25` as year 25.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let year_first = s
        .get(..4)
        .is_some_and(|head| head.chars().all(|c| c.is_ascii_digit()));
    let trailing_year = s
        .rsplit(['/', '-'])
        .next()
        .filter(|year| year.chars().all(|c| c.is_ascii_digit()))
        .map_or(0, str::len);

    let formats: &[&str] = match (year_first, trailing_year) {
        (true, _) => &[
            "%Y-%m-%d", // 2025-01-15
            "%Y/%m/%d", // 2025/01/15
        ],
        (false, 4) => &[
            "%m/%d/%Y", // 01/15/2025
            "%m-%d-%Y", // 01-15-2025
            "%d/%m/%Y", // 15/01/2025 (day first)
        ],
        (false, 2) => &[
            "%m/%d/%y", // 01/15/25
            "%m-%d-%y", // 01-15-25
            "%d/%m/%y", // 15/01/25 (day first)
        ],
        _ => &[],
    };

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::Import(format!("Unable to parse date: {}", s)))
}

/// Parse an amount string, handling currency symbols, commas and parentheses
pub fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', '£', '€', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned
        .parse::<f64>()
        .map_err(|_| Error::Import(format!("Unable to parse amount: {}", s)))
}
