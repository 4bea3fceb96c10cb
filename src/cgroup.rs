use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use nix::unistd::Pid;

use crate::error::ignore_kind;
use crate::Error;

const CGROUP_PROCS: &str = "cgroup.procs";
const MEMORY_MAX: &str = "memory.max";
const MEMORY_SWAP_MAX: &str = "memory.swap.max";
const MEMORY_CURRENT: &str = "memory.current";

/// Recreates `path` as a fresh, empty cgroup directory and writes its memory
/// limit and swap-forbidding control files.
///
/// Matches the parent privileged setup: remove any stale directory left by a
/// previous run (tolerating "does not exist"), recreate it (tolerating a
/// racing creator), then configure `memory.max` and `memory.swap.max`. The
/// child is *not* placed into the cgroup here; see [`add_process`], which is
/// called once the child's PID is known.
pub(crate) fn prepare(path: &Path, memory_limit: u64) -> Result<(), Error> {
    ignore_kind(fs::remove_dir(path), ErrorKind::NotFound)
        .map_err(|v| format!("cannot remove cgroup: {v}"))?;
    ignore_kind(
        fs::DirBuilder::new().mode(0o755).create(path),
        ErrorKind::AlreadyExists,
    )
    .map_err(|v| format!("cannot create cgroup: {v}"))?;
    write_control_file(path, MEMORY_MAX, memory_limit.to_string().as_bytes())
        .map_err(|v| format!("cannot write memory.max: {v}"))?;
    write_control_file(path, MEMORY_SWAP_MAX, b"0").map_err(|v| format!("cannot write memory.swap.max: {v}"))?;
    Ok(())
}

/// Writes `pid` into `<path>/cgroup.procs`, placing the process in the
/// cgroup.
pub(crate) fn add_process(path: &Path, pid: Pid) -> Result<(), Error> {
    write_control_file(path, CGROUP_PROCS, pid.to_string().as_bytes())
        .map_err(|v| format!("cannot write cgroup.procs: {v}").into())
}

/// Reads `<path>/memory.current` and parses it as a decimal byte count.
pub(crate) fn read_memory_current(path: &Path) -> Result<u64, Error> {
    let mut buf = String::new();
    File::open(path.join(MEMORY_CURRENT))
        .map_err(|v| format!("cannot open memory.current: {v}"))?
        .read_to_string(&mut buf)
        .map_err(|v| format!("cannot read memory.current: {v}"))?;
    buf.trim()
        .parse()
        .map_err(|v| format!("cannot parse memory.current: {v}").into())
}

fn write_control_file(dir: &Path, name: &str, data: &[u8]) -> std::io::Result<()> {
    File::options()
        .write(true)
        .open(dir.join(name))?
        .write_all(data)
}
