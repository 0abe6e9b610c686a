//! Registry of external properties and persisted installer settings

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::preferences::Preferences;
use crate::constants::{cleanup, prefs, workdirs, ACTIVE_FRAMEWORK_VERSION_UNHOOKED};
use crate::platform::Platform;
use crate::props::{parse_properties, PropertyMap};

/// Outcome of one pass of [`ConfigRegistry::run_one_time_cleanups`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Removable-media cleanup ran and its flag was set
    pub sdcard: bool,
    /// Debug-log cleanup ran and its flag was set
    pub debug_log: bool,
}

#[derive(Debug)]
struct RegistryState {
    properties: Arc<PropertyMap>,
}

#[derive(Debug)]
pub struct ConfigRegistry {
    base_dir: PathBuf,
    prop_file: PathBuf,
    preferences: Preferences,
    state: Mutex<RegistryState>,
}

impl ConfigRegistry {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        prop_file: impl Into<PathBuf>,
        preferences: Preferences,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            prop_file: prop_file.into(),
            preferences,
            state: Mutex::new(RegistryState {
                properties: Arc::new(PropertyMap::new()),
            }),
        }
    }

    /// Load the property file for the first time
    pub fn initialize(&self) {
        self.reload_properties();
    }

    /// Re-read the property file, replacing the current map wholesale
    ///
    /// An unreadable file yields an empty map; the failure is logged.
    pub fn reload_properties(&self) {
        let map = match read_property_file(&self.prop_file) {
            Ok(Some(map)) => {
                info!(path = %self.prop_file.display(), count = map.len(), "Loaded framework properties");
                map
            }
            Ok(None) => {
                debug!(path = %self.prop_file.display(), "Property file not present");
                PropertyMap::new()
            }
            Err(e) => {
                error!(path = %self.prop_file.display(), error = %e, "Could not read property file");
                PropertyMap::new()
            }
        };

        let map = Arc::new(map);
        self.lock_state().properties = map;
    }

    /// Snapshot of the current properties
    pub fn properties(&self) -> Arc<PropertyMap> {
        Arc::clone(&self.lock_state().properties)
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create the working directories and set their modes
    ///
    /// Failures are logged and skipped. Returns how many directories ended
    /// up fully set up.
    pub fn ensure_directories(&self) -> usize {
        let mut ready = 0;
        for (name, mode) in workdirs::WORKING {
            let dir = self.base_dir.join(name);
            match mkdir_and_chmod(&dir, mode) {
                Ok(()) => {
                    debug!(path = %dir.display(), mode = format_args!("{mode:o}"), "Working directory ready");
                    ready += 1;
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Failed to set up working directory");
                }
            }
        }
        ready
    }

    /// Run each pending one-time cleanup and record the ones that finished
    ///
    /// The removable-media step waits until storage is mounted. A step whose
    /// deletions fail keeps its flag unset and is retried on the next call.
    /// Concurrent callers are serialized so each step runs at most once.
    pub fn run_one_time_cleanups(&self, external_storage: Option<&Path>) -> CleanupReport {
        let _state = self.lock_state();
        let mut report = CleanupReport::default();

        if !self.preferences.get_bool(prefs::CLEANED_UP_SDCARD, false) {
            match external_storage {
                Some(root) => {
                    if delete_all(root, &cleanup::SDCARD_FILES) {
                        self.preferences
                            .edit()
                            .put_bool(prefs::CLEANED_UP_SDCARD, true)
                            .apply();
                        info!(root = %root.display(), "Removed legacy recovery zips");
                        report.sdcard = true;
                    }
                }
                None => debug!("External storage not mounted, deferring cleanup"),
            }
        }

        if !self.preferences.get_bool(prefs::CLEANED_UP_DEBUG_LOG, false)
            && delete_all(&self.base_dir, &cleanup::DEBUG_LOG_FILES)
        {
            self.preferences
                .edit()
                .put_bool(prefs::CLEANED_UP_DEBUG_LOG, true)
                .apply();
            info!("Removed old debug logs");
            report.debug_log = true;
        }

        report
    }

    /// Whether repository downloads may happen
    pub fn downloads_enabled(&self, platform: &dyn Platform) -> bool {
        self.preferences.get_bool(prefs::ENABLE_DOWNLOADS, true)
            && platform.has_internet_permission()
    }
}

/// Framework version active in this process
///
/// Returns [`ACTIVE_FRAMEWORK_VERSION_UNHOOKED`]; the framework patches
/// this function when it is loaded into the process.
#[inline(never)]
pub fn active_framework_version() -> i32 {
    ACTIVE_FRAMEWORK_VERSION_UNHOOKED
}

/// `Ok(None)` when the file does not exist
fn read_property_file(path: &Path) -> io::Result<Option<PropertyMap>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    parse_properties(BufReader::new(file)).map(Some)
}

fn mkdir_and_chmod(dir: &Path, mode: u32) -> io::Result<()> {
    match fs::create_dir(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
        Err(e) => return Err(e),
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

/// Delete `names` under `root`; true if every file is gone afterwards
fn delete_all(root: &Path, names: &[&str]) -> bool {
    let mut all_gone = true;
    for name in names {
        let path = root.join(name);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete");
                all_gone = false;
            }
        }
    }
    all_gone
}
