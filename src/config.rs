use std::fs::File;
use std::path::PathBuf;

use crate::Error;

/// Immutable record of everything the launcher needs to start and supervise
/// one sandboxed payload.
///
/// Constructed once by the front end (or by a test) and never mutated
/// afterwards; every component downstream borrows it for the lifetime of the
/// run.
///
/// `stdin`/`stdout`/`stderr` are already-opened files rather than paths: the
/// front end opens them itself, before the child is ever cloned, so a
/// missing or unwritable redirect target surfaces as an ordinary
/// configuration error instead of a failure deep inside the child's own
/// (by then pivoted) filesystem view. The child only ever `dup2`s these
/// inherited descriptors onto 0/1/2; it never re-opens by path.
#[derive(Debug)]
pub struct Config {
    /// File to read as the payload's stdin. `None` inherits the launcher's.
    pub stdin: Option<File>,
    /// File to write the payload's stdout to. `None` inherits the launcher's.
    pub stdout: Option<File>,
    /// File to write the payload's stderr to. `None` inherits the launcher's.
    pub stderr: Option<File>,
    /// Existing empty directory used as the overlay mount point and pivot target.
    pub rootfs: PathBuf,
    /// Overlay `lowerdir`.
    pub overlay_lowerdir: PathBuf,
    /// Overlay `upperdir`.
    pub overlay_upperdir: PathBuf,
    /// Overlay `workdir`.
    pub overlay_workdir: PathBuf,
    /// Initial working directory inside the sandbox. Defaults to `/`.
    pub workdir: PathBuf,
    /// Payload argument vector; `args[0]` is the executable.
    pub args: Vec<String>,
    /// Payload environment, as `KEY=VALUE` strings.
    pub environ: Vec<String>,
    /// Host-visible cgroup v2 directory the launcher owns.
    pub cgroup_path: PathBuf,
    /// Memory limit, in bytes.
    pub memory_limit: u64,
    /// Wall-clock time limit, in milliseconds.
    pub time_limit: u64,
    /// Path to write the final report to. `None` skips writing a report.
    pub report: Option<PathBuf>,
}

impl Config {
    /// Validates the invariants described in the configuration intake
    /// component: a non-empty argument vector, non-empty path fields, and
    /// strictly positive limits.
    pub fn validate(&self) -> Result<(), Error> {
        if self.args.is_empty() {
            return Err("empty execve arguments".into());
        }
        if self.rootfs.as_os_str().is_empty() {
            return Err("--rootfs argument is required".into());
        }
        if self.overlay_lowerdir.as_os_str().is_empty() {
            return Err("--overlay-lowerdir is required".into());
        }
        if self.overlay_upperdir.as_os_str().is_empty() {
            return Err("--overlay-upperdir is required".into());
        }
        if self.overlay_workdir.as_os_str().is_empty() {
            return Err("--overlay-workdir is required".into());
        }
        if self.cgroup_path.as_os_str().is_empty() {
            return Err("--cgroup-path is required".into());
        }
        if self.memory_limit == 0 {
            return Err("--memory-limit is required".into());
        }
        if self.time_limit == 0 {
            return Err("--time-limit is required".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stdin: None,
            stdout: None,
            stderr: None,
            rootfs: PathBuf::new(),
            overlay_lowerdir: PathBuf::new(),
            overlay_upperdir: PathBuf::new(),
            overlay_workdir: PathBuf::new(),
            workdir: PathBuf::from("/"),
            args: Vec::new(),
            environ: Vec::new(),
            cgroup_path: PathBuf::new(),
            memory_limit: 0,
            time_limit: 0,
            report: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            rootfs: "/tmp/rootfs".into(),
            overlay_lowerdir: "/tmp/lower".into(),
            overlay_upperdir: "/tmp/upper".into(),
            overlay_workdir: "/tmp/work".into(),
            cgroup_path: "/sys/fs/cgroup/test".into(),
            args: vec!["/bin/true".into()],
            memory_limit: 1,
            time_limit: 1,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_minimal_valid_config() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn rejects_empty_args() {
        let mut config = valid_config();
        config.args.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        let mut config = valid_config();
        config.time_limit = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.memory_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_missing_paths() {
        let mut config = valid_config();
        config.rootfs = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_workdir_is_root() {
        assert_eq!(Config::default().workdir, PathBuf::from("/"));
    }
}
