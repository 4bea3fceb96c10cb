use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::Error;

/// Outcome of a single supervised run.
///
/// `exit_code` is the child's normal exit status, or `-1` if it was killed
/// by a signal, stopped, or otherwise did not exit normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub time_ms: u64,
    pub memory_bytes: u64,
    pub exit_code: i32,
}

impl Report {
    /// Writes the three-line decimal report format to `path`.
    pub(crate) fn write_to(&self, path: &Path) -> Result<(), Error> {
        let mut file = File::create(path).map_err(|v| format!("cannot create report {path:?}: {v}"))?;
        write!(
            file,
            "time {}\nmemory {}\nexit_code {}\n",
            self.time_ms, self.memory_bytes, self.exit_code
        )
        .map_err(|v| format!("cannot write report {path:?}: {v}").into())
    }
}
