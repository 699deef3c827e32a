use stackplan_core::paths::CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve the repository a command works on.
///
/// Priority:
/// 1. `--source` flag / `STACKPLAN_SOURCE` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.stackplan.yaml`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_source(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, |dir| dir.join(CONFIG_FILE).is_file())
        .or_else(|| find_upward(&cwd, |dir| dir.join(".git").is_dir()))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, found: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|dir| found(dir)).map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_source_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_source(Some(dir.path())), dir.path());
    }

    #[test]
    fn config_file_marks_the_repository() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "").unwrap();
        let deep = dir.path().join("services/api");
        std::fs::create_dir_all(&deep).unwrap();
        let found = find_upward(&deep, |d| d.join(CONFIG_FILE).is_file()).unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn nothing_found_without_marker() {
        let dir = TempDir::new().unwrap();
        assert!(find_upward(dir.path(), |d| d.join("no-such-marker").exists()).is_none());
    }
}
