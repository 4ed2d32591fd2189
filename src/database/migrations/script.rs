//! Discovery of versioned migration scripts.
//!
//! Scripts live in a single directory and follow the naming convention
//! `V<version>__<description>.sql`, e.g. `V1__create_accounts.sql` or
//! `V2_1__add_account_index.sql`. Underscores in the description become spaces.

use super::version::MigrationVersion;
use super::{MigrationError, MigrationResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const VERSIONED_PREFIX: char = 'V';
const SEPARATOR: &str = "__";
const SUFFIX: &str = ".sql";

/// A migration script resolved from disk
#[derive(Debug, Clone)]
pub struct MigrationScript {
    pub version: MigrationVersion,
    pub description: String,
    /// File name, recorded in the history table
    pub script: String,
    pub path: PathBuf,
    /// blake3 of the script with line endings normalized
    pub checksum: String,
    pub sql: String,
}

impl MigrationScript {
    pub fn from_file(path: &Path) -> MigrationResult<Option<Self>> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some((version, description)) = parse_script_name(file_name)? else {
            return Ok(None);
        };

        let sql = fs::read_to_string(path).map_err(|e| MigrationError::ScriptRead {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(Some(Self {
            version,
            description,
            script: file_name.to_string(),
            path: path.to_path_buf(),
            checksum: checksum(&sql),
            sql,
        }))
    }
}

/// Split `V<version>__<description>.sql` into its version and description.
///
/// Returns `Ok(None)` for files that are not versioned scripts at all and an
/// error for files that look like one but are malformed.
pub fn parse_script_name(file_name: &str) -> MigrationResult<Option<(MigrationVersion, String)>> {
    let Some(stem) = file_name
        .strip_prefix(VERSIONED_PREFIX)
        .and_then(|rest| rest.strip_suffix(SUFFIX))
    else {
        return Ok(None);
    };

    let Some((version, description)) = stem.split_once(SEPARATOR) else {
        return Err(MigrationError::InvalidScriptName {
            script: file_name.to_string(),
            reason: format!("expected V<version>{SEPARATOR}<description>{SUFFIX}"),
        });
    };

    let version = MigrationVersion::parse(version).map_err(|e| MigrationError::InvalidScriptName {
        script: file_name.to_string(),
        reason: e.to_string(),
    })?;

    Ok(Some((version, description.replace('_', " ").trim().to_string())))
}

/// Checksum over the script text, insensitive to CRLF/LF differences
pub fn checksum(sql: &str) -> String {
    let normalized = sql.replace("\r\n", "\n");
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

/// Resolve every versioned script in `location`, sorted by version.
///
/// A missing directory resolves to no scripts.
pub fn discover(location: &Path) -> MigrationResult<Vec<MigrationScript>> {
    if !location.exists() {
        warn!(
            location = %location.display(),
            "Migration location does not exist, no scripts resolved"
        );
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(location).map_err(|e| MigrationError::ScriptRead {
        path: location.to_path_buf(),
        error: e.to_string(),
    })?;

    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::ScriptRead {
            path: location.to_path_buf(),
            error: e.to_string(),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match MigrationScript::from_file(&path)? {
            Some(script) => scripts.push(script),
            None => debug!(file = %path.display(), "Ignoring non-migration file"),
        }
    }

    scripts.sort_by(|a, b| a.version.cmp(&b.version));

    let mut seen: HashMap<&MigrationVersion, &str> = HashMap::new();
    for script in &scripts {
        if let Some(first) = seen.insert(&script.version, &script.script) {
            return Err(MigrationError::DuplicateVersion {
                version: script.version.to_string(),
                first: first.to_string(),
                second: script.script.clone(),
            });
        }
    }

    debug!(
        location = %location.display(),
        count = scripts.len(),
        "Resolved migration scripts"
    );

    Ok(scripts)
}
