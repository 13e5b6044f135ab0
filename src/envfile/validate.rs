//! Required-value validation
//!
//! Every violation is collected before reporting so an operator can fix the
//! whole file in one edit.

use super::keys;
use super::record::ConfigRecord;
use crate::error::{InstallError, InstallResult};
use serde::Serialize;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Missing,
    Empty,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub key: String,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::Missing => write!(f, "{} is not set", self.key),
            ViolationKind::Empty => write!(f, "{} is empty", self.key),
            ViolationKind::Placeholder => write!(f, "{} still has its placeholder value", self.key),
        }
    }
}

/// Check a single required key.
pub fn check_key(record: &ConfigRecord, key: &str) -> Option<Violation> {
    let kind = match record.get(key) {
        None => ViolationKind::Missing,
        Some(v) if v.trim().is_empty() => ViolationKind::Empty,
        Some(v) if v == keys::placeholder(key) => ViolationKind::Placeholder,
        Some(_) => return None,
    };
    Some(Violation { key: key.to_string(), kind })
}

/// Validate `required` against the record, failing with every violation found.
pub fn validate<'a, I>(record: &ConfigRecord, required: I) -> InstallResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let violations: Vec<Violation> = required
        .into_iter()
        .filter_map(|key| check_key(record, key))
        .collect();

    warn_optional_placeholders(record);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(InstallError::InvalidConfig(violations))
    }
}

/// Optional keys left at their template value are allowed, but worth a mention.
fn warn_optional_placeholders(record: &ConfigRecord) {
    for spec in keys::KEYS.iter().filter(|k| !k.required) {
        if record.get(spec.name) == Some(keys::placeholder(spec.name).as_str()) {
            warn!(key = spec.name, "optional key still has its placeholder value");
        }
    }
}
