//! Named-format validation over a fixed format table.
//!
//! The table covers the formats the JSON-Schema importer carries over.
//! The format name is checked against the table during the per-term
//! compile pass; validation then runs the matcher.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::graph::{CompiledValue, Node};
use crate::property::PropertyValue;
use crate::term::{vocab, TermCompiler, Validator};

type FormatFn = fn(&str) -> bool;

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
        .unwrap()
});
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});
static DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());
static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}):(\d{2}):(\d{2})(\.\d+)?([Zz]|[+-]\d{2}:\d{2})?$").unwrap());

fn is_date(s: &str) -> bool {
    let Some(captures) = DATE.captures(s) else {
        return false;
    };
    let month: u32 = captures[2].parse().unwrap_or(0);
    let day: u32 = captures[3].parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

fn is_time(s: &str) -> bool {
    let Some(captures) = TIME.captures(s) else {
        return false;
    };
    let hour: u32 = captures[1].parse().unwrap_or(99);
    let minute: u32 = captures[2].parse().unwrap_or(99);
    let second: u32 = captures[3].parse().unwrap_or(99);
    hour < 24 && minute < 60 && second < 61
}

fn is_date_time(s: &str) -> bool {
    match s.split_once(['T', 't']) {
        Some((date, time)) => is_date(date) && is_time(time),
        None => false,
    }
}

static FORMATS: Lazy<BTreeMap<&'static str, FormatFn>> = Lazy::new(|| {
    let mut table: BTreeMap<&'static str, FormatFn> = BTreeMap::new();
    table.insert("date", is_date as FormatFn);
    table.insert("time", is_time);
    table.insert("date-time", is_date_time);
    table.insert("email", |s| EMAIL.is_match(s));
    table.insert("hostname", |s| HOSTNAME.is_match(s));
    table.insert("uuid", |s| UUID.is_match(s));
    table.insert("ipv4", |s| s.parse::<std::net::Ipv4Addr>().is_ok());
    table.insert("ipv6", |s| s.parse::<std::net::Ipv6Addr>().is_ok());
    table.insert("uri", |s| url::Url::parse(s).is_ok());
    table.insert("regex", |s| Regex::new(s).is_ok());
    table
});

/// True if the format name is in the table.
pub fn known_format(name: &str) -> bool {
    FORMATS.contains_key(name)
}

/// Checks a value against a named format.
#[derive(Debug, Clone, Copy)]
pub struct FormatValidator;

impl Validator for FormatValidator {
    fn name(&self) -> &'static str {
        "format"
    }

    fn validate_value(&self, value: Option<&str>, schema_node: &Node) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        let name = schema_node
            .compiled(vocab::FORMAT)
            .and_then(CompiledValue::as_str)
            .or_else(|| schema_node.property(vocab::FORMAT).and_then(PropertyValue::as_str))
            .ok_or_else(|| Error::validation("format", "missing format name"))?;
        let Some(check) = FORMATS.get(name) else {
            return Err(Error::validation("format", format!("unknown format: {name}")));
        };
        if check(value) {
            return Ok(());
        }
        Err(Error::Validation {
            validator: "format",
            msg: format!("invalid value for {name}"),
            value: Some(value.to_string()),
        })
    }
}

impl TermCompiler for FormatValidator {
    fn compile_term(&self, _term: &str, value: &PropertyValue) -> Result<Option<CompiledValue>> {
        let name = value
            .as_str()
            .ok_or_else(|| Error::validation("format", "format is not a string value"))?;
        if !known_format(name) {
            return Err(Error::validation("format", format!("unknown format: {name}")));
        }
        Ok(Some(CompiledValue::Str(name.into())))
    }
}
