//! Thin wrapper around the raw `clone3(2)` syscall.
//!
//! `nix` does not expose `clone3` because its argument struct is still
//! growing upstream, and does not expose the legacy `clone(2)` C wrapper in a
//! way that is sound to call from safe Rust (it requires a caller-managed
//! stack and a C entry-point function pointer). `clone3` with `stack` and
//! `stack_size` left zero instead duplicates the calling thread's stack
//! copy-on-write, exactly like `fork()` — the call returns twice, once in
//! each process — which lets the rest of this crate treat it like an
//! ordinary fork with extra namespace flags.

use nix::errno::Errno;
use nix::unistd::Pid;

#[repr(C, align(8))]
#[derive(Debug, Default)]
struct CloneArgs {
    flags: u64,
    pidfd: u64,
    child_tid: u64,
    parent_tid: u64,
    exit_signal: u64,
    stack: u64,
    stack_size: u64,
    tls: u64,
    set_tid: u64,
    set_tid_size: u64,
    cgroup: u64,
}

/// Which namespaces the clone should create.
///
/// This mirrors the original `clone(2)` flag set exactly: user, mount, PID,
/// network, IPC, and UTS. The cgroup namespace is deliberately absent here —
/// per the child preamble it is unshared separately, after the parent has
/// placed the child into its cgroup using the host-visible path.
pub(crate) struct CloneNamespaces {
    pub newuser: bool,
    pub newns: bool,
    pub newpid: bool,
    pub newnet: bool,
    pub newipc: bool,
    pub newuts: bool,
}

impl CloneNamespaces {
    fn flags(&self) -> u64 {
        let mut flags = 0u64;
        if self.newuser {
            flags |= nix::libc::CLONE_NEWUSER as u64;
        }
        if self.newns {
            flags |= nix::libc::CLONE_NEWNS as u64;
        }
        if self.newpid {
            flags |= nix::libc::CLONE_NEWPID as u64;
        }
        if self.newnet {
            flags |= nix::libc::CLONE_NEWNET as u64;
        }
        if self.newipc {
            flags |= nix::libc::CLONE_NEWIPC as u64;
        }
        if self.newuts {
            flags |= nix::libc::CLONE_NEWUTS as u64;
        }
        flags
    }
}

pub(crate) enum CloneResult {
    Child,
    Parent { child: Pid },
}

/// Calls `clone3(2)` with the requested namespace flags and no explicit
/// stack.
///
/// # Safety
///
/// After this call returns `CloneResult::Child`, the caller is running as a
/// freshly cloned process sharing the parent's stack copy-on-write. Until
/// that process calls `execve` or `_exit`, it must not unwind past this
/// call's frame, must not run Rust destructors that assume the parent's
/// process-wide state (threads, global allocator metadata racing the
/// parent) is exclusively its own, and must avoid any action that only the
/// real parent should perform exactly once (freeing shared file
/// descriptors, etc.).
pub(crate) unsafe fn clone3(namespaces: &CloneNamespaces) -> Result<CloneResult, Errno> {
    let args = CloneArgs {
        flags: namespaces.flags(),
        ..Default::default()
    };
    let res = nix::libc::syscall(
        nix::libc::SYS_clone3,
        &args as *const CloneArgs,
        core::mem::size_of::<CloneArgs>(),
    );
    Errno::result(res).map(|v| match v {
        0 => CloneResult::Child,
        v => CloneResult::Parent {
            child: Pid::from_raw(v as nix::libc::pid_t),
        },
    })
}
