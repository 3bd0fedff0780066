// [apps/agent/src/single_instance.rs]
//! On-disk pid-file guard enforcing "at most one cracker process per
//! agent". A live process probe on Linux reads `/proc/<pid>`; on other
//! targets liveness can't be checked this way, so a stale pidfile is
//! always treated as abandoned rather than risk a false "still running"
//! that could wedge an agent forever.

use std::path::{Path, PathBuf};

pub struct SingleInstanceGuard {
    pidfile: PathBuf,
}

impl SingleInstanceGuard {
    /// Fails with the stale pid if a live process still holds the guard.
    /// A pidfile pointing at a dead process is removed and claimed fresh.
    pub fn acquire(cache_dir: &Path, cracking_binary_name: &str) -> Result<Self, u32> {
        let pidfile = cache_dir.join(format!("{cracking_binary_name}.pid"));

        if let Some(existing_pid) = read_pid(&pidfile) {
            if process_is_alive(existing_pid) {
                return Err(existing_pid);
            }
            let _ = std::fs::remove_file(&pidfile);
        }

        Ok(Self { pidfile })
    }

    pub fn claim(&self, pid: u32) -> std::io::Result<()> {
        std::fs::write(&self.pidfile, pid.to_string())
    }

    pub fn release(self) {
        let _ = std::fs::remove_file(&self.pidfile);
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(target_os = "linux")]
fn process_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_is_alive(_pid: u32) -> bool {
    false
}

/// Attempts a graceful `SIGTERM`, waits briefly, then force-kills. Used
/// when a stale-but-alive cracker from a previous crashed process is
/// found blocking a new assignment.
pub async fn terminate_process(pid: u32) {
    #[cfg(unix)]
    {
        let _ = tokio::process::Command::new("kill").args(["-TERM", &pid.to_string()]).status().await;
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        if process_is_alive(pid) {
            let _ = tokio::process::Command::new("kill").args(["-KILL", &pid.to_string()]).status().await;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_cleanly_when_no_pidfile_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let guard = SingleInstanceGuard::acquire(tmp.path(), "hashcat").unwrap();
        guard.claim(std::process::id()).unwrap();
        assert!(tmp.path().join("hashcat.pid").exists());
    }

    #[test]
    fn reclaims_a_pidfile_left_by_a_dead_process() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("hashcat.pid"), "999999999").unwrap();
        let guard = SingleInstanceGuard::acquire(tmp.path(), "hashcat");
        assert!(guard.is_ok());
    }

    #[test]
    fn release_removes_the_pidfile() {
        let tmp = tempfile::tempdir().unwrap();
        let guard = SingleInstanceGuard::acquire(tmp.path(), "hashcat").unwrap();
        guard.claim(std::process::id()).unwrap();
        let pidfile = tmp.path().join("hashcat.pid");
        assert!(pidfile.exists());
        guard.release();
        assert!(!pidfile.exists());
    }
}
