use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

use crate::config::Config;

/// Append-only log of destructive dictionary operations
#[derive(Debug, Clone)]
pub struct AuditLog {
    log_dir: PathBuf,
    enabled: bool,
}

impl AuditLog {
    pub fn new(log_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            log_dir: log_dir.into(),
            enabled,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.audit_dir, config.audit_enabled)
    }

    pub fn path(&self) -> PathBuf {
        self.log_dir.join("audit.log")
    }

    /// Write an entry to the audit log
    pub fn log(&self, entry: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        std::fs::create_dir_all(&self.log_dir)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())?;

        writeln!(
            file,
            "[{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            entry
        )?;
        Ok(())
    }

    /// Log, reporting but otherwise ignoring failures
    pub fn record(&self, entry: &str) {
        if let Err(e) = self.log(entry) {
            warn!("⚠️ Audit log write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entries_are_appended() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("logs"), true);
        audit.log("DICTIONARY CLEAR: 3 entries").unwrap();
        audit.record("DICTIONARY IMPORT: 2 new");

        let content = std::fs::read_to_string(audit.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("DICTIONARY CLEAR: 3 entries"));
        assert!(lines[1].starts_with('['));
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path(), false);
        audit.log("ignored").unwrap();
        assert!(!audit.path().exists());
    }
}
