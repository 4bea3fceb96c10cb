use std::time::{Duration, Instant};

use nix::unistd::{getgid, getuid};

use crate::clone::{clone3, CloneNamespaces, CloneResult};
use crate::pipe::new_pipe;
use crate::report::Report;
use crate::{cgroup, child, supervisor, usermap, Config, Error};

const NAMESPACES: CloneNamespaces = CloneNamespaces {
    newuser: true,
    newns: true,
    newpid: true,
    newnet: true,
    newipc: true,
    newuts: true,
};

/// Runs one sandboxed payload end to end: prepares the cgroup, clones the
/// child, completes the privileged parent-side setup the child cannot do to
/// itself, then supervises it until it exits or is killed.
///
/// Writes the report to `config.report` if set, and always returns it to the
/// caller regardless. Takes `Config` by value (rather than by reference) so
/// that the parent can drop its own copies of the stdio redirect files right
/// after `clone3` returns, per the resource-cleanup requirements: the child
/// already has its own independent copies of the same descriptors from the
/// clone, so the parent holding them open any longer only risks readers of
/// e.g. a `--stdout` FIFO never seeing EOF.
pub fn run(mut config: Config) -> Result<Report, Error> {
    config.validate()?;

    cgroup::prepare(&config.cgroup_path, config.memory_limit)?;

    let initialize = new_pipe()?;
    let finalize = new_pipe()?;

    // Safety: the child side below performs no work before either execve or
    // an early, explicit `std::process::exit`, so it never unwinds past this
    // frame or runs destructors meant for the parent's exclusive state.
    let clone_result = unsafe { clone3(&NAMESPACES) }.map_err(|v| format!("cannot clone: {v}"))?;

    match clone_result {
        CloneResult::Child => {
            let err = child::run(&config, initialize.rx(), finalize.tx());
            eprintln!("error: {err}");
            std::process::exit(127);
        }
        CloneResult::Parent { child } => {
            tracing::info!(?child, "cloned child");

            // The child received its own copies of these descriptors at
            // clone time; the parent has no further use for them.
            drop(config.stdin.take());
            drop(config.stdout.take());
            drop(config.stderr.take());

            let initialize_tx = initialize.tx();
            let finalize_rx = finalize.rx();

            let setup_result = (|| -> Result<(), Error> {
                usermap::map_root(child, getuid(), getgid())?;
                cgroup::add_process(&config.cgroup_path, child)?;
                Ok(())
            })();

            // Signal the child regardless of whether setup succeeded so it
            // does not block forever; a failed setup surfaces as the child's
            // own mount/chdir calls failing inside the freshly (un)mapped
            // namespace, which `supervise` then reports as a non-zero exit.
            drop(initialize_tx);

            if let Err(err) = setup_result {
                let _ = nix::sys::signal::kill(child, nix::sys::signal::Signal::SIGKILL);
                let _ = nix::sys::wait::waitpid(child, None);
                return Err(err);
            }
            tracing::info!(?child, cgroup_path = ?config.cgroup_path, "placed child into cgroup");

            crate::pipe::wait_close(finalize_rx).map_err(|v| format!("parent: {v}"))?;

            // Timing starts only once the child has finished its own mount
            // namespace and pivot_root setup and signaled finalize, so the
            // configured time limit bounds only the payload's own runtime.
            let started_at = Instant::now();

            let report = supervisor::supervise(
                child,
                &config.cgroup_path,
                Duration::from_millis(config.time_limit),
                config.memory_limit,
                started_at,
            )?;

            if let Some(path) = &config.report {
                report.write_to(path)?;
                tracing::info!(path = ?path, "wrote report");
            }

            Ok(report)
        }
    }
}
