//! Creating the `.env` file when it does not exist yet
//!
//! Two strategies, picked at build time:
//! - interactive (default): prompt for every key, empty input takes the default
//! - template (`--features template-config`): write placeholders for hand-editing
//!
//! An existing file is never touched.

use super::keys::{self, DefaultValue, KeySpec};
use crate::error::InstallResult;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Interactive,
    Template,
}

impl Strategy {
    /// The strategy compiled into this binary.
    pub const fn for_build() -> Self {
        if cfg!(feature = "template-config") {
            Strategy::Template
        } else {
            Strategy::Interactive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialized {
    Existing,
    Interactive,
    Template,
}

/// Ensure a configuration file exists at `path`.
///
/// Prompts go to `output`, answers are read from `input`.
pub fn materialize(
    path: &Path,
    strategy: Strategy,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> InstallResult<Materialized> {
    if path.exists() {
        debug!(path = %path.display(), "configuration file already present");
        return Ok(Materialized::Existing);
    }

    let values = match strategy {
        Strategy::Interactive => prompt_values(input, output)?,
        Strategy::Template => template_values(),
    };

    let mut file = match create_new(path) {
        Ok(f) => f,
        // Another installer won the race; its file stands
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(Materialized::Existing),
        Err(e) => return Err(e.into()),
    };
    file.write_all(render(&values, strategy).as_bytes())?;
    file.sync_all()?;

    info!(path = %path.display(), ?strategy, "wrote configuration file");
    match strategy {
        Strategy::Interactive => Ok(Materialized::Interactive),
        Strategy::Template => {
            writeln!(output, "⚠ Created {} with placeholder values.", path.display())?;
            writeln!(output, "  Edit it with your real keys, then run the installer again.")?;
            Ok(Materialized::Template)
        }
    }
}

fn prompt_values(input: &mut dyn BufRead, output: &mut dyn Write) -> io::Result<Vec<(&'static KeySpec, String)>> {
    writeln!(output, "No .env found, let's create one. Press Enter to accept a default.")?;

    let mut values = Vec::with_capacity(keys::KEYS.len());
    let mut group = "";
    for spec in keys::KEYS {
        if spec.group != group {
            group = spec.group;
            writeln!(output, "\n[{}]", group)?;
        }

        match spec.default {
            DefaultValue::None => write!(output, "{}: ", spec.prompt)?,
            DefaultValue::Value("") => write!(output, "{} [empty]: ", spec.prompt)?,
            DefaultValue::Value(v) => write!(output, "{} [{}]: ", spec.prompt, v)?,
            DefaultValue::GeneratedSecret => write!(output, "{} [generate]: ", spec.prompt)?,
        }
        output.flush()?;

        let mut answer = String::new();
        // EOF reads as an empty answer
        input.read_line(&mut answer)?;
        let answer = answer.trim();

        let value = if answer.is_empty() {
            match spec.default {
                DefaultValue::None => String::new(),
                DefaultValue::Value(v) => v.to_string(),
                DefaultValue::GeneratedSecret => keys::generate_secret(),
            }
        } else {
            answer.to_string()
        };
        values.push((spec, value));
    }
    writeln!(output)?;

    Ok(values)
}

fn template_values() -> Vec<(&'static KeySpec, String)> {
    keys::KEYS
        .iter()
        .map(|spec| (spec, keys::placeholder(spec.name)))
        .collect()
}

fn render(values: &[(&'static KeySpec, String)], strategy: Strategy) -> String {
    let mut out = String::new();
    out.push_str("# Dasy configuration\n");
    out.push_str(&format!(
        "# Generated by dasy-install on {}\n",
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ));
    if strategy == Strategy::Template {
        out.push_str("# Replace every your_*_here value before running the installer again.\n");
    }

    let mut group = "";
    for (spec, value) in values {
        if spec.group != group {
            group = spec.group;
            out.push_str(&format!("\n# {}\n", group));
        }
        out.push_str(&format!("{}={}\n", spec.name, value));
    }
    out
}

#[cfg(unix)]
fn create_new(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new().write(true).create_new(true).mode(0o600).open(path)
}

#[cfg(not(unix))]
fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envfile::ConfigRecord;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn answers(lines: &[&str]) -> Cursor<Vec<u8>> {
        Cursor::new(lines.join("\n").into_bytes())
    }

    #[test]
    fn test_interactive_writes_answers_and_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        let mut input = answers(&["sk-live", "gm-live", "", "", "", "mydb"]);
        let mut output: Vec<u8> = Vec::new();

        let outcome = materialize(&path, Strategy::Interactive, &mut input, &mut output).unwrap();
        assert_eq!(outcome, Materialized::Interactive);

        let record = ConfigRecord::load(&path).unwrap();
        assert_eq!(record.get("OPENAI_API_KEY"), Some("sk-live"));
        assert_eq!(record.get("GEMINI_API_KEY"), Some("gm-live"));
        assert_eq!(record.get("ANTHROPIC_API_KEY"), Some(""));
        assert_eq!(record.get("POSTGRES_DB"), Some("mydb"));
        // Input ran out: remaining keys take their defaults
        assert_eq!(record.get("POSTGRES_USER"), Some("dasy"));
        assert_eq!(record.get("ORCHESTRATOR_PORT"), Some("8000"));
        assert_eq!(record.get("JWT_SECRET").map(str::len), Some(64));
        assert_eq!(record.len(), keys::KEYS.len());

        let prompts = String::from_utf8(output).unwrap();
        assert!(prompts.contains("OpenAI API key: "));
        assert!(prompts.contains("PostgreSQL port [5432]: "));
    }

    #[test]
    fn test_template_writes_placeholders() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        let mut output: Vec<u8> = Vec::new();

        let outcome = materialize(&path, Strategy::Template, &mut io::empty(), &mut output).unwrap();
        assert_eq!(outcome, Materialized::Template);

        let record = ConfigRecord::load(&path).unwrap();
        for spec in keys::KEYS {
            assert_eq!(record.get(spec.name), Some(keys::placeholder(spec.name).as_str()));
        }
        assert!(String::from_utf8(output).unwrap().contains("Edit it with your real keys"));
    }

    #[test]
    fn test_existing_file_is_never_overwritten() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        fs::write(&path, "OPENAI_API_KEY=hand-edited\n").unwrap();

        let mut input = answers(&["should-not-be-read"]);
        let mut output: Vec<u8> = Vec::new();
        let outcome = materialize(&path, Strategy::Interactive, &mut input, &mut output).unwrap();

        assert_eq!(outcome, Materialized::Existing);
        assert_eq!(fs::read_to_string(&path).unwrap(), "OPENAI_API_KEY=hand-edited\n");
        assert!(output.is_empty());
    }

    #[test]
    fn test_second_run_keeps_first_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");

        materialize(&path, Strategy::Template, &mut io::empty(), &mut Vec::<u8>::new()).unwrap();
        let first = fs::read_to_string(&path).unwrap();

        let outcome = materialize(&path, Strategy::Interactive, &mut answers(&["x"]), &mut Vec::<u8>::new()).unwrap();
        assert_eq!(outcome, Materialized::Existing);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");

        materialize(&path, Strategy::Template, &mut io::empty(), &mut Vec::<u8>::new()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
