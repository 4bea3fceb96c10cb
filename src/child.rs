use std::ffi::CString;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;

use nix::sched::{unshare, CloneFlags};
use nix::unistd::{chdir, dup2, execve, sethostname};

use crate::pipe::wait_close;
use crate::{mount, Config, Error};

/// Runs inside the cloned child. Never returns on success: the final step is
/// `execve`, which replaces this process image outright.
///
/// `initialize_rx` is the read end of the parent->child barrier: the parent
/// closes it once it has placed this process's PID into the memory cgroup
/// and written its uid/gid maps, both of which require the child's PID and
/// so cannot happen before `clone3` returns in the parent. Everything below
/// this wait assumes those two steps already happened.
pub(crate) fn run(config: &Config, initialize_rx: File, finalize_tx: File) -> Error {
    match run_inner(config, initialize_rx, finalize_tx) {
        Ok(never) => match never {},
        Err(err) => err,
    }
}

fn run_inner(config: &Config, initialize_rx: File, finalize_tx: File) -> Result<std::convert::Infallible, Error> {
    wait_close(initialize_rx).map_err(|v| format!("child: {v}"))?;

    unshare(CloneFlags::CLONE_NEWCGROUP).map_err(|v| format!("cannot unshare cgroup namespace: {v}"))?;

    mount::setup_mount_namespace(config)?;
    tracing::info!("mount namespace and pivot_root complete");

    sethostname("sandbox").map_err(|v| format!("cannot set hostname: {v}"))?;

    chdir(&config.workdir).map_err(|v| format!("cannot chdir to {:?}: {v}", config.workdir))?;

    redirect_stdio(config)?;

    // Signal the parent that the namespace and filesystem setup is complete
    // and the supervisor loop may begin polling, then drop our copy of the
    // writer so its close is visible.
    drop(finalize_tx);

    let argv = to_cstrings(&config.args)?;
    let envp = to_cstrings(&config.environ)?;
    let err = execve(&argv[0], &argv, &envp).expect_err("execve only returns on failure");
    Err(format!("cannot execve {:?}: {err}", config.args.first()).into())
}

/// Duplicates each already-open redirect file onto its standard fileno slot.
///
/// The files themselves were opened by the front end, by host path, before
/// `clone3` ever ran; they are inherited across the clone as ordinary open
/// descriptors, so this only ever needs `dup2`, never a path lookup (which
/// by this point would resolve inside the pivoted sandbox root instead of
/// the host filesystem).
fn redirect_stdio(config: &Config) -> Result<(), Error> {
    if let Some(file) = &config.stdin {
        dup2(file.as_raw_fd(), 0).map_err(|v| format!("cannot redirect stdin: {v}"))?;
    }
    if let Some(file) = &config.stdout {
        dup2(file.as_raw_fd(), 1).map_err(|v| format!("cannot redirect stdout: {v}"))?;
    }
    if let Some(file) = &config.stderr {
        dup2(file.as_raw_fd(), 2).map_err(|v| format!("cannot redirect stderr: {v}"))?;
    }
    Ok(())
}

fn to_cstrings(values: &[String]) -> Result<Vec<CString>, Error> {
    values
        .iter()
        .map(|v| CString::new(std::ffi::OsStr::new(v).as_bytes()).map_err(|e| format!("invalid argument {v:?}: {e}").into()))
        .collect()
}
