//! The `date` conversion function

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use super::{Args, FunctionError};
use crate::value::Value;

/// Source format used when none is configured
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// A timestamp parsed under the source format
#[derive(Debug, Clone, Copy)]
enum Parsed {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
    Time(NaiveTime),
}

/// Re-renders date strings written in a fixed source format
///
/// Values that do not parse, and targets that are not valid format strings,
/// come back unchanged so a bad date never aborts a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormatter {
    source_format: String,
}

impl Default for DateFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT)
    }
}

impl DateFormatter {
    pub fn new(source_format: impl Into<String>) -> Self {
        Self {
            source_format: source_format.into(),
        }
    }

    pub fn source_format(&self) -> &str {
        &self.source_format
    }

    /// Convert `value` from the source format to `target`
    pub fn convert(&self, value: &str, target: &str) -> String {
        if target == self.source_format {
            return value.to_string();
        }
        let items: Vec<Item<'_>> = StrftimeItems::new(target).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return value.to_string();
        }
        let Some(parsed) = self.parse(value) else {
            return value.to_string();
        };

        let mut out = String::new();
        let written = match parsed {
            Parsed::Zoned(dt) => write!(out, "{}", dt.format_with_items(items.iter())),
            Parsed::Naive(dt) => write!(out, "{}", dt.format_with_items(items.iter())),
            Parsed::Time(t) => write!(out, "{}", t.format_with_items(items.iter())),
        };
        match written {
            Ok(()) => out,
            Err(_) => value.to_string(),
        }
    }

    fn parse(&self, value: &str) -> Option<Parsed> {
        let format = self.source_format.as_str();
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(Parsed::Zoned(dt));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Parsed::Naive(dt));
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(Parsed::Naive(date.and_time(NaiveTime::MIN)));
        }
        NaiveTime::parse_from_str(value, format)
            .ok()
            .map(Parsed::Time)
    }

    /// Entry point when registered as a template function
    pub(super) fn call(&self, args: Args<'_>) -> Result<Value, FunctionError> {
        args.expect_count(2)?;
        let value = args.str(0)?;
        let target = args.str(1)?;
        Ok(Value::String(self.convert(value, target)))
    }
}
