//! Collaborators the shell drives but does not implement
//!
//! Loaders, screens and host services are traits so the shell can run
//! against a real host, the command-line binary, or test doubles.

use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::constants::{busybox, paths};

/// Subsystem that can report whether it is currently loading
pub trait LoadStatus: Send + Sync {
    fn is_loading(&self) -> bool;
}

/// Loader that fetches its data once the first screen appears
pub trait FirstLoad: Send + Sync {
    fn trigger_first_load_if_necessary(&self);
}

/// Repository loader: busy status plus the first-load trigger
pub trait RepoLoader: LoadStatus + FirstLoad {}

impl<T: LoadStatus + FirstLoad> RepoLoader for T {}

/// A visible UI screen
pub trait Screen: Send + Sync {
    fn name(&self) -> &str;

    /// Show or hide the indeterminate progress indicator
    fn set_progress_visible(&self, visible: bool);
}

/// Host services invoked once at startup
pub trait Platform: Send + Sync {
    /// Root of mounted removable media, `None` when not mounted
    fn external_storage_root(&self) -> Option<PathBuf>;

    fn has_internet_permission(&self) -> bool;

    fn init_notifications(&self);

    /// Whether the statically linked busybox is available
    fn check_static_busybox(&self) -> bool;

    /// Remove busybox binaries left behind by old versions
    fn remove_busybox(&self);
}

/// [`Platform`] for running the shell on a regular host
#[derive(Debug, Clone)]
pub struct HostPlatform {
    base_dir: PathBuf,
    external_storage: Option<PathBuf>,
}

impl HostPlatform {
    /// Removable media is taken from `$EXTERNAL_STORAGE` when that directory exists
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let external_storage = std::env::var_os(paths::EXTERNAL_STORAGE_ENV)
            .map(PathBuf::from)
            .filter(|p| p.is_dir());
        Self::with_external_storage(base_dir, external_storage)
    }

    pub fn with_external_storage(
        base_dir: impl Into<PathBuf>,
        external_storage: Option<PathBuf>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            external_storage,
        }
    }
}

impl Platform for HostPlatform {
    fn external_storage_root(&self) -> Option<PathBuf> {
        self.external_storage.clone()
    }

    fn has_internet_permission(&self) -> bool {
        true
    }

    fn init_notifications(&self) {
        info!("Notifications initialized");
    }

    fn check_static_busybox(&self) -> bool {
        let path = self.base_dir.join(busybox::STATIC_BINARY);
        let available = path.is_file();
        debug!(path = %path.display(), available, "Checked static busybox");
        available
    }

    fn remove_busybox(&self) {
        let path = self.base_dir.join(busybox::LEGACY_BINARY);
        match fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "Removed legacy busybox"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove legacy busybox"),
        }
    }
}
