// src/config/highlight.rs
//! Extra spellings of the owner's name to emphasize in author lists.
//!
//! The alias file is TOML with a single key:
//!
//! ```toml
//! aliases = ["Dixit A.", "A K Dixit"]
//! ```
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const ENV_ALIASES_PATH: &str = "HIGHLIGHT_ALIASES_PATH";
pub const DEFAULT_ALIASES_PATH: &str = "config/highlight_aliases.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AliasFile {
    #[serde(default)]
    aliases: Vec<String>,
}

/// Which alias file applies: `$HIGHLIGHT_ALIASES_PATH` when set (it must exist),
/// else `default` when present, else none.
pub fn aliases_path_with<F>(lookup: F, default: &Path) -> Result<Option<PathBuf>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(p) = lookup(ENV_ALIASES_PATH).filter(|p| !p.trim().is_empty()) {
        let path = PathBuf::from(p.trim());
        if !path.is_file() {
            return Err(anyhow!(
                "{ENV_ALIASES_PATH} points to {}, which is not a file",
                path.display()
            ));
        }
        return Ok(Some(path));
    }
    Ok(default.is_file().then(|| default.to_path_buf()))
}

/// Read one alias file and clean it against `owner_name`.
pub fn read_aliases(path: &Path, owner_name: &str) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading highlight aliases from {}", path.display()))?;
    let file: AliasFile = toml::from_str(&content)
        .with_context(|| format!("parsing highlight aliases in {}", path.display()))?;
    Ok(clean_aliases(file.aliases, owner_name))
}

/// Aliases for `owner_name` from the environment-selected or default file.
/// No file means no aliases.
pub fn load_aliases(owner_name: &str) -> Result<Vec<String>> {
    let path = aliases_path_with(|k| std::env::var(k).ok(), Path::new(DEFAULT_ALIASES_PATH))?;
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let aliases = read_aliases(&path, owner_name)?;
    tracing::info!(
        target: "config",
        path = %path.display(),
        count = aliases.len(),
        "highlight aliases loaded"
    );
    Ok(aliases)
}

/// Collapse inner whitespace, drop blanks and the owner's own name, and keep
/// the first spelling of case-insensitive duplicates in file order.
fn clean_aliases(raw: Vec<String>, owner_name: &str) -> Vec<String> {
    let owner = fold(owner_name);
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|a| a.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|a| !a.is_empty())
        .filter(|a| {
            let key = fold(a);
            key != owner && seen.insert(key)
        })
        .collect()
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
