pub mod git;
pub mod platform;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

static CWD_LOCK: Mutex<()> = Mutex::new(());

/// Enter a working directory for the duration of a test.
///
/// Deploy steps run their git command lines in the process working
/// directory, which is global, so tests that change it serialize on one
/// lock and restore the previous directory on drop.
pub struct WorkingDir {
    previous: PathBuf,
    _guard: MutexGuard<'static, ()>,
}

pub fn enter(dir: &Path) -> WorkingDir {
    let guard = CWD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let previous = std::env::current_dir().expect("current dir");
    std::env::set_current_dir(dir).expect("chdir into test repo");
    WorkingDir {
        previous,
        _guard: guard,
    }
}

impl Drop for WorkingDir {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.previous);
    }
}
