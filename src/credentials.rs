use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::types::Credential;

/// Parse word list content into an ordered list of credentials.
///
/// Each line is split on `:` and must yield exactly two fields
/// (`username:password`). Trailing empty fields are dropped before counting:
/// `a:b:` is kept as `(a, b)`, while `admin:` (one field left), `a:b:c` and
/// lines without a colon are skipped. Malformed lines are ignored, never
/// rejected. Duplicates are kept.
pub fn parse_credentials_str(s: &str) -> Vec<Credential> {
    s.lines().filter_map(parse_line).collect()
}

/// Load credentials from a word list file. Errors only if the file cannot be read.
pub fn load_credentials_from_path(path: impl AsRef<Path>) -> Result<Vec<Credential>> {
    let content = fs::read(path.as_ref()).with_context(|| {
        format!(
            "failed to read credentials file: {}",
            path.as_ref().display()
        )
    })?;
    Ok(parse_credentials_str(&String::from_utf8_lossy(&content)))
}

fn parse_line(line: &str) -> Option<Credential> {
    let mut fields: Vec<&str> = line.split(':').collect();
    while fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    match fields.as_slice() {
        [user, pass] => Some(Credential::new(*user, *pass)),
        _ => None,
    }
}
