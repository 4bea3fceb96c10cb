use std::fs::create_dir;
use std::io::ErrorKind;
use std::path::Path;

use nix::fcntl::{open, OFlag};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sys::stat::Mode;
use nix::unistd::{chdir, fchdir};

use crate::error::ignore_kind;
use crate::{Config, Error};

/// Builds the child's private mount namespace and pivots into it.
///
/// Runs entirely inside the cloned child, after the cgroup namespace has
/// been unshared and before the hostname/stdio/workdir steps. Each step is a
/// precondition for the next: the private remount must happen before the
/// overlay is mounted (so host mount propagation cannot see it), the overlay
/// must be mounted before the base filesystems are mounted under it, and all
/// of that must happen before `pivot_root`.
pub(crate) fn setup_mount_namespace(config: &Config) -> Result<(), Error> {
    remount_private(&config.rootfs)?;
    mount_overlay(config)?;
    mount_base_filesystems(&config.rootfs)?;
    pivot_root(&config.rootfs)
}

fn remount_private(rootfs: &Path) -> Result<(), Error> {
    // First detach from the host's mount propagation entirely...
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_SLAVE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|v| format!("cannot remount \"/\" slave: {v}"))?;
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|v| format!("cannot remount \"/\" private: {v}"))?;
    // ...then bind rootfs over itself so it is its own mount point, which
    // pivot_root requires.
    mount(
        Some(rootfs),
        rootfs,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|v| format!("cannot bind-mount rootfs: {v}"))?;
    Ok(())
}

fn mount_overlay(config: &Config) -> Result<(), Error> {
    let lowerdir = config
        .overlay_lowerdir
        .to_str()
        .ok_or("invalid overlay lowerdir")?;
    let upperdir = config
        .overlay_upperdir
        .to_str()
        .ok_or("invalid overlay upperdir")?;
    let workdir = config
        .overlay_workdir
        .to_str()
        .ok_or("invalid overlay workdir")?;
    let data = format!("lowerdir={lowerdir},upperdir={upperdir},workdir={workdir}");
    mount(
        Some("overlay"),
        &config.rootfs,
        Some("overlay"),
        MsFlags::empty(),
        Some(data.as_str()),
    )
    .map_err(|v| format!("cannot mount rootfs overlay: {v}").into())
}

struct BaseFilesystem {
    source: &'static str,
    target: &'static str,
    fstype: &'static str,
    flags: MsFlags,
    data: Option<&'static str>,
}

const BASE_FILESYSTEMS: &[BaseFilesystem] = &[
    BaseFilesystem {
        source: "sysfs",
        target: "sys",
        fstype: "sysfs",
        flags: MsFlags::from_bits_truncate(
            MsFlags::MS_NOEXEC.bits() | MsFlags::MS_NOSUID.bits() | MsFlags::MS_NODEV.bits() | MsFlags::MS_RDONLY.bits(),
        ),
        data: None,
    },
    BaseFilesystem {
        source: "proc",
        target: "proc",
        fstype: "proc",
        flags: MsFlags::from_bits_truncate(
            MsFlags::MS_NOEXEC.bits() | MsFlags::MS_NOSUID.bits() | MsFlags::MS_NODEV.bits(),
        ),
        data: None,
    },
    BaseFilesystem {
        source: "tmpfs",
        target: "dev",
        fstype: "tmpfs",
        flags: MsFlags::from_bits_truncate(MsFlags::MS_NOSUID.bits() | MsFlags::MS_STRICTATIME.bits()),
        data: Some("mode=755,size=65536k"),
    },
    BaseFilesystem {
        source: "devpts",
        target: "dev/pts",
        fstype: "devpts",
        flags: MsFlags::from_bits_truncate(MsFlags::MS_NOSUID.bits() | MsFlags::MS_NOEXEC.bits()),
        data: Some("newinstance,ptmxmode=0666,mode=0620"),
    },
    BaseFilesystem {
        source: "shm",
        target: "dev/shm",
        fstype: "tmpfs",
        flags: MsFlags::from_bits_truncate(
            MsFlags::MS_NOEXEC.bits() | MsFlags::MS_NOSUID.bits() | MsFlags::MS_NODEV.bits(),
        ),
        data: Some("mode=1777,size=65536k"),
    },
    BaseFilesystem {
        source: "mqueue",
        target: "dev/mqueue",
        fstype: "mqueue",
        flags: MsFlags::from_bits_truncate(
            MsFlags::MS_NOEXEC.bits() | MsFlags::MS_NOSUID.bits() | MsFlags::MS_NODEV.bits(),
        ),
        data: None,
    },
    BaseFilesystem {
        source: "cgroup",
        target: "sys/fs/cgroup",
        fstype: "cgroup2",
        flags: MsFlags::from_bits_truncate(
            MsFlags::MS_NOEXEC.bits()
                | MsFlags::MS_NOSUID.bits()
                | MsFlags::MS_NODEV.bits()
                | MsFlags::MS_RELATIME.bits()
                | MsFlags::MS_RDONLY.bits(),
        ),
        data: None,
    },
];

fn mount_base_filesystems(rootfs: &Path) -> Result<(), Error> {
    for fs in BASE_FILESYSTEMS {
        let target = rootfs.join(fs.target);
        ignore_kind(create_dir(&target), ErrorKind::AlreadyExists)
            .map_err(|v| format!("cannot create {}: {v}", fs.target))?;
        mount(
            Some(fs.source),
            &target,
            Some(fs.fstype),
            fs.flags,
            fs.data,
        )
        .map_err(|v| format!("cannot mount {}: {v}", fs.target))?;
    }
    Ok(())
}

/// Atomically swaps the process root to `new_root`, leaving the old root
/// mounted on top, then detaches and unmounts the old root.
///
/// Mirrors `pivot_root(2)`'s "new_root and put_old may be the same
/// directory" idiom: both the new root and the mount to detach are
/// `new_root` itself, referenced first by path and then, once the process
/// has already chdir'd into it, by `"."`.
fn pivot_root(new_root: &Path) -> Result<(), Error> {
    let old_root = open("/", OFlag::O_DIRECTORY | OFlag::O_RDONLY, Mode::empty())
        .map_err(|v| format!("cannot open old root: {v}"))?;
    let new_root_fd = open(new_root, OFlag::O_DIRECTORY | OFlag::O_RDONLY, Mode::empty())
        .map_err(|v| format!("cannot open new root: {v}"))?;
    chdir(new_root).map_err(|v| format!("cannot chdir to new root: {v}"))?;
    nix::unistd::pivot_root(".", ".").map_err(|v| format!("cannot pivot root: {v}"))?;
    fchdir(&old_root).map_err(|v| format!("cannot chdir back to old root: {v}"))?;
    mount(
        None::<&str>,
        ".",
        None::<&str>,
        MsFlags::MS_SLAVE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|v| format!("cannot remount old root slave: {v}"))?;
    umount2(".", MntFlags::MNT_DETACH).map_err(|v| format!("cannot unmount old root: {v}"))?;
    drop(new_root_fd);
    drop(old_root);
    chdir("/").map_err(|v| format!("cannot chdir to \"/\": {v}").into())
}
