//! Spending analytics for dashboards.
//!
//! Records are converted into one target currency, then grouped by category or
//! by date bucket. Partial data is expected here, so a record with a missing or
//! unrecognised currency is read as being in the fallback currency instead of
//! failing the whole report.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::balance::EPSILON;
use crate::currency::{ConversionError, convert_checked};

const CATEGORY_STYLES: &[(&str, &str, &str)] = &[
    ("accommodation", "Accommodation", "#6366f1"),
    ("transportation", "Transportation", "#0ea5e9"),
    ("food", "Food & Drinks", "#f97316"),
    ("activities", "Activities", "#22c55e"),
    ("shopping", "Shopping", "#ec4899"),
    ("other", "Other", "#94a3b8"),
];

const EXTRA_COLORS: &[&str] = &["#eab308", "#14b8a6", "#a855f7", "#ef4444", "#84cc16"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub date: NaiveDate,
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub label: String,
    pub color: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    fn bucket(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Daily => date,
            Granularity::Monthly => date.with_day(1).unwrap_or(date),
        }
    }

    fn label(self, bucket: NaiveDate) -> String {
        match self {
            Granularity::Daily => bucket.format("%b %d").to_string(),
            Granularity::Monthly => bucket.format("%b %Y").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub label: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingReport {
    pub currency: String,
    pub total: f64,
    pub categories: Vec<CategoryTotal>,
    pub daily: Vec<SeriesPoint>,
    pub monthly: Vec<SeriesPoint>,
    pub highest_day: Option<DailyTotal>,
}

/// The converter plus the currencies every aggregation needs.
pub struct Conversion<'a, F> {
    convert: F,
    target: &'a str,
    fallback: &'a str,
}

impl<'a, F> Conversion<'a, F>
where
    F: Fn(f64, &str, &str) -> Result<f64, ConversionError>,
{
    pub fn new(convert: F, target: &'a str, fallback: &'a str) -> Self {
        Conversion {
            convert,
            target,
            fallback,
        }
    }

    pub fn target(&self) -> &str {
        self.target
    }

    /// The record's amount in the target currency.
    pub fn amount_of(&self, record: &FinancialRecord) -> Result<f64, ConversionError> {
        let source = record
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .unwrap_or(self.fallback);

        match convert_checked(&self.convert, record.amount, source, self.target) {
            Err(ConversionError::UnknownCurrency(code))
                if code.eq_ignore_ascii_case(source) && !source.eq_ignore_ascii_case(self.fallback) =>
            {
                convert_checked(&self.convert, record.amount, self.fallback, self.target)
            }
            other => other,
        }
    }
}

fn category_key(category: &str) -> String {
    let key = category.trim().to_lowercase();
    if key.is_empty() { "other".to_string() } else { key }
}

fn title_case(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// Sums that round to zero cents don't belong on a chart.
fn rounds_to_zero(amount: f64) -> bool {
    amount.abs() < EPSILON / 2.0
}

pub fn total_spent<F>(
    records: &[FinancialRecord],
    conversion: &Conversion<'_, F>,
) -> Result<f64, ConversionError>
where
    F: Fn(f64, &str, &str) -> Result<f64, ConversionError>,
{
    records.iter().map(|r| conversion.amount_of(r)).sum()
}

/// Per-category totals in first-seen order, with display label and color.
pub fn category_breakdown<F>(
    records: &[FinancialRecord],
    conversion: &Conversion<'_, F>,
) -> Result<Vec<CategoryTotal>, ConversionError>
where
    F: Fn(f64, &str, &str) -> Result<f64, ConversionError>,
{
    let mut totals: IndexMap<String, f64> = IndexMap::new();
    for record in records {
        *totals.entry(category_key(&record.category)).or_insert(0.0) += conversion.amount_of(record)?;
    }

    let mut extra_colors = EXTRA_COLORS.iter().cycle();
    let mut breakdown = Vec::with_capacity(totals.len());
    for (category, amount) in totals {
        if rounds_to_zero(amount) {
            continue;
        }
        let (label, color) = match CATEGORY_STYLES.iter().find(|(key, ..)| *key == category) {
            Some((_, label, color)) => (label.to_string(), color.to_string()),
            None => (
                title_case(&category),
                extra_colors.next().copied().unwrap_or("#94a3b8").to_string(),
            ),
        };
        breakdown.push(CategoryTotal {
            category,
            label,
            color,
            amount,
        });
    }
    Ok(breakdown)
}

/// Totals per day or month, ascending by date.
pub fn time_series<F>(
    records: &[FinancialRecord],
    granularity: Granularity,
    conversion: &Conversion<'_, F>,
) -> Result<Vec<SeriesPoint>, ConversionError>
where
    F: Fn(f64, &str, &str) -> Result<f64, ConversionError>,
{
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in records {
        *buckets.entry(granularity.bucket(record.date)).or_insert(0.0) += conversion.amount_of(record)?;
    }

    Ok(buckets
        .into_iter()
        .map(|(date, amount)| SeriesPoint {
            date,
            label: granularity.label(date),
            amount,
        })
        .collect())
}

/// The day with the largest total. On a tie the day seen first in `records` wins.
pub fn highest_spending_day<F>(
    records: &[FinancialRecord],
    conversion: &Conversion<'_, F>,
) -> Result<Option<DailyTotal>, ConversionError>
where
    F: Fn(f64, &str, &str) -> Result<f64, ConversionError>,
{
    let mut days: IndexMap<NaiveDate, f64> = IndexMap::new();
    for record in records {
        *days.entry(record.date).or_insert(0.0) += conversion.amount_of(record)?;
    }

    let mut highest: Option<DailyTotal> = None;
    for (date, amount) in days {
        if highest.is_none_or(|best| amount > best.amount) {
            highest = Some(DailyTotal { date, amount });
        }
    }
    Ok(highest)
}

pub fn analyze<F>(
    records: &[FinancialRecord],
    conversion: &Conversion<'_, F>,
) -> Result<SpendingReport, ConversionError>
where
    F: Fn(f64, &str, &str) -> Result<f64, ConversionError>,
{
    Ok(SpendingReport {
        currency: conversion.target().to_string(),
        total: total_spent(records, conversion)?,
        categories: category_breakdown(records, conversion)?,
        daily: time_series(records, Granularity::Daily, conversion)?,
        monthly: time_series(records, Granularity::Monthly, conversion)?,
        highest_day: highest_spending_day(records, conversion)?,
    })
}
