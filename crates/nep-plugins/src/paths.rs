use std::env;
use std::path::{Path, PathBuf};

use dirs::home_dir;

/// If set (to anything), no rc file is read.
pub const ENV_RC_IGNORE: &str = "NCRCENV_IGNORE";
/// Explicit rc file, read instead of the search path.
pub const ENV_RC_FILE: &str = "NCRCENV_RC";

/// Names checked in each scope, in order.
pub const RC_NAMES: [&str; 3] = [".ncrc", ".daprc", ".dodsrc"];

/// ~/.ncrc, ~/.daprc, ~/.dodsrc
pub fn home_rc_files() -> Vec<PathBuf> {
    home_dir().map(|h| rc_files_in(&h)).unwrap_or_default()
}

/// ./.ncrc, ./.daprc, ./.dodsrc
pub fn cwd_rc_files() -> Vec<PathBuf> {
    env::current_dir().map(|d| rc_files_in(&d)).unwrap_or_default()
}

pub fn rc_files_in(dir: &Path) -> Vec<PathBuf> {
    RC_NAMES.iter().map(|n| dir.join(n)).collect()
}

/// Candidate rc files in precedence order (home scope first). Files that do
/// not exist are left in; readers skip them.
pub fn rc_search_path() -> Vec<PathBuf> {
    if env::var_os(ENV_RC_IGNORE).is_some() {
        return Vec::new();
    }
    if let Some(p) = env::var_os(ENV_RC_FILE) {
        return vec![PathBuf::from(p)];
    }
    let mut files = home_rc_files();
    for p in cwd_rc_files() {
        // Running from $HOME would list every file twice.
        if !files.contains(&p) {
            files.push(p);
        }
    }
    files
}
