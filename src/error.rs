use std::io::ErrorKind;

/// Boxed error type shared by every fallible operation in this crate.
///
/// Every wrapper around a syscall attaches a short, specific context string
/// rather than propagating a bare [`nix::errno::Errno`] or [`std::io::Error`].
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Runs `result`, treating an I/O error of the given `kind` as success.
///
/// Used for the "remove a cgroup that might not exist" and "create a
/// directory that might already exist" races described by the parent
/// preamble.
pub(crate) fn ignore_kind(result: std::io::Result<()>, kind: ErrorKind) -> std::io::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == kind => Ok(()),
        Err(err) => Err(err),
    }
}

/// Runs `result`, treating the given `errno` as success.
///
/// Used for `ESRCH` on `kill` (the child already exited) and other
/// transient, explicitly-tolerated syscall failures.
pub(crate) fn ignore_errno<T: Default>(
    result: Result<T, nix::errno::Errno>,
    errno: nix::errno::Errno,
) -> Result<T, nix::errno::Errno> {
    match result {
        Ok(v) => Ok(v),
        Err(v) if v == errno => Ok(T::default()),
        Err(v) => Err(v),
    }
}
