//! Process-wide snap7 loader.
//!
//! The library is opened at most once. The first successful
//! [`load_library`] call wins; later calls return the cached driver whatever
//! path they pass.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;

use super::native::NativeDriver;
use super::Driver;
use crate::error::{Error, Result};

static DRIVER: OnceCell<Arc<NativeDriver>> = OnceCell::new();

/// Location recorded by [`set_library_location`] or by the first load.
static LIB_LOCATION: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

const LIB_NAME: &str = "snap7";

/// One place to look for the library, in resolution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Passed by the caller.
    Explicit(PathBuf),
    /// Recorded by [`set_library_location`].
    Cached(PathBuf),
    /// Shipped in `lib/` next to the executable.
    Bundled(PathBuf),
    /// Bare file name resolved by the system loader's search path.
    System(OsString),
    /// In the current directory.
    Local(PathBuf),
}

impl Candidate {
    fn target(&self) -> OsString {
        match self {
            Candidate::Explicit(p)
            | Candidate::Cached(p)
            | Candidate::Bundled(p)
            | Candidate::Local(p) => p.clone().into_os_string(),
            Candidate::System(name) => name.clone(),
        }
    }

    /// A location someone asked for: failing to open it is an error rather
    /// than a reason to keep looking.
    fn is_requested(&self) -> bool {
        matches!(self, Candidate::Explicit(_) | Candidate::Cached(_))
    }
}

/// Remember `path` as the library location for the next first load.
///
/// Has no effect on a library that is already loaded.
pub fn set_library_location(path: impl Into<PathBuf>) {
    *LIB_LOCATION.lock() = Some(path.into());
}

pub fn library_location() -> Option<PathBuf> {
    LIB_LOCATION.lock().clone()
}

/// Platform file name of the snap7 library (`libsnap7.so`, `snap7.dll`,
/// `libsnap7.dylib`).
pub fn library_file_name() -> OsString {
    libloading::library_filename(LIB_NAME)
}

/// Candidate locations in resolution order. Bundled and local candidates
/// are only listed when the file exists.
pub fn candidates(
    explicit: Option<&Path>,
    cached: Option<&Path>,
    exe_dir: Option<&Path>,
    cwd: Option<&Path>,
) -> Vec<Candidate> {
    let file_name = library_file_name();
    let mut out = Vec::new();
    if let Some(path) = explicit {
        out.push(Candidate::Explicit(path.to_path_buf()));
    }
    if let Some(path) = cached {
        out.push(Candidate::Cached(path.to_path_buf()));
    }
    if let Some(dir) = exe_dir {
        let bundled = dir.join("lib").join(&file_name);
        if bundled.is_file() {
            out.push(Candidate::Bundled(bundled));
        }
    }
    out.push(Candidate::System(file_name.clone()));
    if let Some(dir) = cwd {
        let local = dir.join(&file_name);
        if local.is_file() {
            out.push(Candidate::Local(local));
        }
    }
    out
}

/// Load the snap7 library, or return the already loaded one.
pub fn load_library(explicit: Option<&Path>) -> Result<Arc<NativeDriver>> {
    DRIVER
        .get_or_try_init(|| {
            let cached = library_location();
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf));
            let cwd = std::env::current_dir().ok();
            let found = candidates(explicit, cached.as_deref(), exe_dir.as_deref(), cwd.as_deref());
            open_first(found).map(Arc::new)
        })
        .cloned()
}

/// The process-wide driver as a trait object.
pub fn driver() -> Result<Arc<dyn Driver>> {
    let driver: Arc<dyn Driver> = load_library(None)?;
    Ok(driver)
}

fn open_first(found: Vec<Candidate>) -> Result<NativeDriver> {
    let mut tried = Vec::new();
    for candidate in found {
        // The first requested location decides; discovery is skipped.
        let requested = candidate.is_requested();
        let target = candidate.target();
        tracing::debug!("trying snap7 library {}", Path::new(&target).display());
        match NativeDriver::open(&target) {
            Ok(driver) => {
                tracing::info!("loaded snap7 library from {}", driver.path().display());
                *LIB_LOCATION.lock() = Some(driver.path().to_path_buf());
                return Ok(driver);
            }
            Err(err @ Error::DriverLoad { .. }) if requested => return Err(err),
            Err(Error::DriverLoad { path, source }) => {
                tracing::debug!("can't load {}: {source}", path.display());
                tried.push(path);
            }
            Err(err) => return Err(err),
        }
    }
    Err(Error::DriverNotFound { tried })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let found = candidates(
            Some(Path::new("/explicit/libsnap7.so")),
            Some(Path::new("/cached/libsnap7.so")),
            Some(dir.path()),
            Some(dir.path()),
        );
        assert_eq!(
            found,
            vec![
                Candidate::Explicit(PathBuf::from("/explicit/libsnap7.so")),
                Candidate::Cached(PathBuf::from("/cached/libsnap7.so")),
                Candidate::System(library_file_name()),
            ]
        );
    }

    #[test]
    fn test_bundled_and_local_when_present() {
        let exe = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        std::fs::create_dir(exe.path().join("lib")).unwrap();
        let bundled = exe.path().join("lib").join(library_file_name());
        let local = cwd.path().join(library_file_name());
        std::fs::write(&bundled, b"").unwrap();
        std::fs::write(&local, b"").unwrap();

        let found = candidates(None, None, Some(exe.path()), Some(cwd.path()));
        assert_eq!(
            found,
            vec![
                Candidate::Bundled(bundled),
                Candidate::System(library_file_name()),
                Candidate::Local(local),
            ]
        );
    }

    #[test]
    fn test_requested_path_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not-a-library.so");
        std::fs::write(&bogus, b"definitely not ELF").unwrap();
        let err = open_first(vec![
            Candidate::Explicit(bogus.clone()),
            Candidate::System(OsString::from("also-missing")),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DriverLoad { ref path, .. } if *path == bogus));
    }

    #[test]
    fn test_discovery_failures_end_in_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join(library_file_name());
        std::fs::write(&bogus, b"junk").unwrap();
        let err = open_first(vec![
            Candidate::System(OsString::from("s7link-test-no-such-library")),
            Candidate::Local(bogus.clone()),
        ])
        .unwrap_err();
        match err {
            Error::DriverNotFound { tried } => {
                assert_eq!(tried.len(), 2);
                assert_eq!(tried[1], bogus);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_load_with_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("concurrent-bogus.so");
        std::fs::write(&bogus, b"not a library").unwrap();
        let barrier = std::sync::Barrier::new(8);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        load_library(Some(&bogus))
                    })
                })
                .collect();
            for handle in handles {
                match handle.join().expect("loader thread panicked") {
                    // Only possible when a real library was loaded earlier.
                    Ok(_) => assert!(DRIVER.get().is_some()),
                    Err(err) => assert!(
                        matches!(err, Error::DriverLoad { ref path, .. } if *path == bogus),
                        "unexpected {err:?}"
                    ),
                }
            }
        });
        // A failed load leaves the singleton free for a later attempt.
        if DRIVER.get().is_none() {
            assert!(load_library(Some(&bogus)).is_err());
        }
    }
}
