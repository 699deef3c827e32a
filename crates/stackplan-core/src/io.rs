use crate::error::{Result, StackplanError};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting plan and bundle files.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write a file only if it does not already exist. Returns true if written.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// KEY=VALUE env files
// ---------------------------------------------------------------------------

/// Parse KEY=VALUE content. Comments and blank lines are skipped; a value may
/// be wrapped in matching single or double quotes.
pub fn parse_env_pairs(content: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (i, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            return Err(StackplanError::MalformedInputs {
                line: i + 1,
                reason: "expected KEY=VALUE".to_string(),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(StackplanError::MalformedInputs {
                line: i + 1,
                reason: "key cannot be empty".to_string(),
            });
        }
        pairs.push((key.to_string(), unquote(value.trim()).to_string()));
    }
    Ok(pairs)
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Render an inputs template with one empty `export KEY=` line per name.
pub fn render_env_template(header: &str, keys: &[String]) -> String {
    let mut out = String::new();
    for line in header.lines() {
        out.push_str("# ");
        out.push_str(line);
        out.push('\n');
    }
    for key in keys {
        out.push_str("export ");
        out.push_str(key);
        out.push_str("=\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/checkout.plan");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn write_if_missing_skips_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inputs.env");
        std::fs::write(&path, b"original").unwrap();
        assert!(!write_if_missing(&path, b"new").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn parse_env_skips_comments_and_unquotes() {
        let content = "# header\nARGOCD_SERVER=argocd.example.com\n\nexport TOKEN=\"abc=def\"\n";
        let pairs = parse_env_pairs(content).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("ARGOCD_SERVER".to_string(), "argocd.example.com".to_string()),
                ("TOKEN".to_string(), "abc=def".to_string()),
            ]
        );
    }

    #[test]
    fn parse_env_rejects_missing_equals() {
        let err = parse_env_pairs("FOO=1\nBAR\n").unwrap_err();
        assert!(matches!(err, StackplanError::MalformedInputs { line: 2, .. }));
    }

    #[test]
    fn template_lists_every_key() {
        let out = render_env_template("inputs for checkout", &["A".into(), "B".into()]);
        assert_eq!(out, "# inputs for checkout\nexport A=\nexport B=\n");
        let pairs = parse_env_pairs(&out).unwrap();
        assert_eq!(
            pairs,
            vec![("A".to_string(), String::new()), ("B".to_string(), String::new())]
        );
    }
}
