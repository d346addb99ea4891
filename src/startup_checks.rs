//! Startup requirement validation for nickstat-exporter.
//!
//! Checks that the process table can be read before the first tick. None of
//! the findings abort startup; unreadable processes are skipped per tick.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_proc_access(proc_root)?;

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - I/O wait of other users' processes may read as zero");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

/// Check the procfs mount and access to pid 1
fn check_proc_access(proc_root: &Path) -> Result<(), ValidationError> {
    if !proc_root.join("uptime").exists() {
        error!("❌ {} does not look like a procfs mount", proc_root.display());
        return Err(ValidationError::ProcNotMounted(
            proc_root.display().to_string(),
        ));
    }

    let test_file = proc_root.join("1").join("stat");
    match fs::metadata(&test_file) {
        Ok(_) => {
            info!("✅ {} access: can read process table", proc_root.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot read {} - insufficient permissions", test_file.display());
            Err(ValidationError::InsufficientPermissions(e.to_string()))
        }
        Err(e) => {
            // Containers with their own pid namespace may lack pid 1 in a foreign root.
            debug!("Could not stat {}: {}", test_file.display(), e);
            Ok(())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("procfs not mounted at {0}")]
    ProcNotMounted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_procfs_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            validate_requirements(dir.path()),
            Err(ValidationError::ProcNotMounted(_))
        ));
    }

    #[test]
    fn test_fake_procfs_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("uptime"), "100.00 50.00\n").expect("uptime");
        fs::create_dir(dir.path().join("1")).expect("pid dir");
        fs::write(dir.path().join("1").join("stat"), "1 (init) S 0").expect("stat");
        assert!(validate_requirements(dir.path()).is_ok());
    }
}
