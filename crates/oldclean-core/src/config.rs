use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::Operator, errors::Error, Result};

const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 60 * 60;

/// Typed configuration for one cleanup run.
///
/// Built once at startup and passed down explicitly; nothing below `main`
/// reads the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub operator: Operator,

    // Files
    pub document_path: PathBuf,
    pub changelog_path: PathBuf,
    pub backup_dir: PathBuf,

    // Confirmation
    pub confirm_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let bot_token = get("CLEANER_BOT_TOKEN").ok_or_else(|| {
            Error::Config("CLEANER_BOT_TOKEN environment variable is required".to_string())
        })?;

        let admin = get("CLEANER_ADMIN_ID").ok_or_else(|| {
            Error::Config("CLEANER_ADMIN_ID environment variable is required".to_string())
        })?;
        let admin_id = admin.trim().parse::<i64>().map_err(|_| {
            Error::Config(format!("CLEANER_ADMIN_ID must be a numeric id, got: {admin}"))
        })?;

        let document_path = get("CLEANER_DOCUMENT").map(PathBuf::from).ok_or_else(|| {
            Error::Config("CLEANER_DOCUMENT environment variable is required".to_string())
        })?;
        let changelog_path = get("CLEANER_CHANGELOG").map(PathBuf::from).ok_or_else(|| {
            Error::Config("CLEANER_CHANGELOG environment variable is required".to_string())
        })?;

        // Backups default to a sibling `backups/` directory of the document.
        let backup_dir = get("CLEANER_BACKUP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_backup_dir(&document_path));

        let confirm_timeout = match get("CLEANER_CONFIRM_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    Error::Config(format!(
                        "CLEANER_CONFIRM_TIMEOUT_SECS must be a number of seconds, got: {raw}"
                    ))
                })?;
                if secs == 0 {
                    return Err(Error::Config(
                        "CLEANER_CONFIRM_TIMEOUT_SECS must be > 0".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECS),
        };

        Ok(Self {
            bot_token,
            operator: Operator::private(admin_id),
            document_path,
            changelog_path,
            backup_dir,
            confirm_timeout,
        })
    }
}

fn default_backup_dir(document: &Path) -> PathBuf {
    match document.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("backups"),
        _ => PathBuf::from("backups"),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
