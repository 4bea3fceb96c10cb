use std::fs::File;
use std::io::Write;

use nix::unistd::{Gid, Pid, Uid};

use crate::Error;

/// Maps the launcher's own effective uid/gid to root (id 0) inside the
/// child's freshly created user namespace.
///
/// This launcher is one-shot and non-multi-tenant (see Non-goals), so it
/// only ever needs a single 1-id range mapped as root; it does not implement
/// subuid/subgid range delegation or shell out to `newuidmap`/`newgidmap` the
/// way a long-lived multi-tenant container daemon would.
///
/// `setgroups` must be set to `deny` before a non-root gid map can be
/// written — the kernel refuses `gid_map` writes from an unprivileged
/// process otherwise.
pub(crate) fn map_root(pid: Pid, uid: Uid, gid: Gid) -> Result<(), Error> {
    write_id_map(pid, "uid_map", 0, uid.as_raw())
        .map_err(|v| format!("cannot write uid_map: {v}"))?;
    write_proc_file(pid, "setgroups", b"deny\n")
        .map_err(|v| format!("cannot write setgroups: {v}"))?;
    write_id_map(pid, "gid_map", 0, gid.as_raw())
        .map_err(|v| format!("cannot write gid_map: {v}"))?;
    Ok(())
}

fn write_id_map(pid: Pid, file: &str, container_id: u32, host_id: u32) -> std::io::Result<()> {
    write_proc_file(pid, file, format!("{container_id} {host_id} 1\n").as_bytes())
}

fn write_proc_file(pid: Pid, file: &str, data: &[u8]) -> std::io::Result<()> {
    File::options()
        .write(true)
        .truncate(true)
        .open(format!("/proc/{}/{file}", pid.as_raw()))?
        .write_all(data)
}
