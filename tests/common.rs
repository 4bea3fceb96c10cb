use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Once;

use rand::distributions::{Alphanumeric, DistString as _};
use safeexec::Error;
use tar::Archive;

pub struct TempDir(PathBuf);

impl TempDir {
    #[allow(unused)]
    pub fn new() -> Result<Self, Error> {
        let tmpdir = Path::new(env!("CARGO_TARGET_TMPDIR"));
        let path = loop {
            let path = tmpdir.join(format!("test-{}", rand_string(32)));
            match std::fs::metadata(&path) {
                Ok(_) => continue,
                Err(v) if v.kind() == ErrorKind::NotFound => break path,
                Err(v) => return Err(v.into()),
            }
        };
        std::fs::create_dir_all(&path)?;
        Ok(Self(path))
    }

    #[allow(unused)]
    pub fn join<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.0.join(path)
    }

    #[allow(unused)]
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[allow(unused)]
pub fn rand_string(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

/// Downloads and unpacks a static busybox rootfs into `./tests`, caching it
/// across tests in a single process run.
#[allow(unused)]
pub fn get_rootfs() -> Result<Archive<File>, Error> {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        if Path::new("./tests/rootfs.tar").exists() {
            return;
        }
        assert!(std::process::Command::new("curl")
            .arg("-fsSL")
            .arg("--retry")
            .arg("5")
            .arg("https://github.com/docker-library/busybox/raw/31d342ad033e27c18723a516a2274ab39547be27/stable/glibc/busybox.tar.xz")
            .arg("-o")
            .arg("rootfs.tar.xz")
            .current_dir("./tests")
            .spawn()
            .unwrap()
            .wait()
            .unwrap()
            .success());
        assert!(std::process::Command::new("xz")
            .arg("-df")
            .arg("rootfs.tar.xz")
            .current_dir("./tests")
            .spawn()
            .unwrap()
            .wait()
            .unwrap()
            .success());
    });
    let mut rootfs = Archive::new(File::open("./tests/rootfs.tar")?);
    rootfs.set_preserve_permissions(true);
    rootfs.set_preserve_ownerships(true);
    rootfs.set_unpack_xattrs(true);
    Ok(rootfs)
}

/// Host-visible cgroup v2 directory to nest test cgroups under.
///
/// Mirrors the current process's own cgroup by default, or `TEST_CGROUP_PATH`
/// when the test runner's own cgroup is not writable (e.g. inside another
/// container).
#[allow(unused)]
pub fn get_cgroup_root() -> Result<PathBuf, Error> {
    if let Ok(v) = std::env::var("TEST_CGROUP_PATH") {
        return Ok(PathBuf::from(v));
    }
    let data = std::fs::read_to_string("/proc/self/cgroup")?;
    for line in data.lines() {
        let parts: Vec<_> = line.split(':').collect();
        if parts.get(1).map(|v| !v.is_empty()).unwrap_or(true) {
            continue;
        }
        let name = parts.get(2).ok_or("expected cgroup path")?.trim_start_matches('/');
        return Ok(PathBuf::from("/sys/fs/cgroup").join(name));
    }
    Err("current process is not in any cgroup".into())
}

pub struct TempCgroup(PathBuf);

impl TempCgroup {
    #[allow(unused)]
    pub fn new() -> Result<Self, Error> {
        let path = get_cgroup_root()?.join(format!("test-{}", rand_string(32)));
        Ok(Self(path))
    }

    #[allow(unused)]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempCgroup {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir(&self.0);
    }
}
