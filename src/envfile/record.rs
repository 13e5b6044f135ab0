//! Loading `.env` files into an explicit configuration record
//!
//! Parsing is done by `dotenvy`'s iterators, which hand back pairs without
//! setting anything in the process environment. The record is then passed
//! explicitly to the stages that need it.

use super::keys;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::warn;

/// Parsed `KEY=VALUE` pairs from a `.env` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRecord {
    values: BTreeMap<String, String>,
    skipped_lines: Vec<String>,
}

impl ConfigRecord {
    pub fn load(path: &Path) -> io::Result<Self> {
        let entries = dotenvy::from_path_iter(path).map_err(|e| match e {
            dotenvy::Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        })?;
        Ok(Self::collect(entries))
    }

    /// Parse `.env` text. Blank and `#` lines are ignored, malformed lines are
    /// skipped with a warning, a repeated key keeps its last value.
    pub fn parse(content: &str) -> Self {
        Self::collect(dotenvy::from_read_iter(content.as_bytes()))
    }

    fn collect(entries: impl Iterator<Item = dotenvy::Result<(String, String)>>) -> Self {
        let mut record = ConfigRecord::default();

        for entry in entries {
            let (key, value) = match entry {
                Ok(pair) => pair,
                Err(dotenvy::Error::LineParse(line, _)) => {
                    warn!(line = %line.trim(), "skipping malformed .env line (expected KEY=VALUE)");
                    record.skipped_lines.push(line);
                    continue;
                }
                Err(dotenvy::Error::Io(e)) => {
                    warn!(error = %e, "stopped reading .env early");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "skipping unreadable .env entry");
                    continue;
                }
            };

            if keys::lookup(&key).is_none() {
                match keys::suggest(&key) {
                    Some(close) => warn!(key = %key, suggestion = close, "unrecognized key, did you mean {}?", close),
                    None => warn!(key = %key, "unrecognized key"),
                }
            }

            if record.values.contains_key(&key) {
                warn!(key = %key, "key defined more than once, keeping the last value");
            }
            record.values.insert(key, value);
        }

        record
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pairs suitable for `Command::envs`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Lines that were not `KEY=VALUE` shaped, as written.
    pub fn skipped_lines(&self) -> &[String] {
        &self.skipped_lines
    }
}
