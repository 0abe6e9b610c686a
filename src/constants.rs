//! Application-wide constants
//!
//! Fixed paths, preference keys and file names used by the installer shell.

/// Filesystem locations
pub mod paths {
    /// Private data directory of the installer package
    pub const BASE_DIR: &str = "/data/data/de.robv.android.xposed.installer/";

    /// Property file written by the framework installer
    pub const PROP_FILE: &str = "/system/xposed.prop";

    /// Preferences file, relative to the base directory
    pub const PREFS_FILE: &str = "shared_prefs/preferences.json";

    /// Environment variable pointing at the removable-media root
    pub const EXTERNAL_STORAGE_ENV: &str = "EXTERNAL_STORAGE";
}

/// Working directories created at startup, relative to the base directory
pub mod workdirs {
    /// (name, mode) pairs
    pub const WORKING: [(&str, u32); 3] = [("bin", 0o771), ("conf", 0o771), ("log", 0o777)];
}

/// Preference keys
pub mod prefs {
    pub const CLEANED_UP_SDCARD: &str = "cleaned_up_sdcard";
    pub const CLEANED_UP_DEBUG_LOG: &str = "cleaned_up_debug_log";
    pub const ENABLE_DOWNLOADS: &str = "enable_downloads";
}

/// Files removed by the one-time cleanups
pub mod cleanup {
    /// Flashable zips older installers left on the removable-media root
    pub const SDCARD_FILES: [&str; 3] = [
        "Xposed-Disabler-CWM.zip",
        "Xposed-Disabler-Recovery.zip",
        "Xposed-Installer-Recovery.zip",
    ];

    /// Debug logs, relative to the base directory
    pub const DEBUG_LOG_FILES: [&str; 2] = ["log/debug.log", "log/debug.log.old"];
}

/// Busybox assets, relative to the base directory
pub mod busybox {
    /// Statically linked busybox shipped with the installer
    pub const STATIC_BINARY: &str = "bin/busybox-xposed";

    /// Dynamically linked busybox extracted by old versions
    pub const LEGACY_BINARY: &str = "bin/busybox";
}

/// Property keys the installer reads
pub mod props {
    pub const VERSION: &str = "version";
    pub const ARCH: &str = "arch";
    pub const MIN_SDK: &str = "minsdk";
    pub const MAX_SDK: &str = "maxsdk";
}

/// Shell configuration
pub mod config {
    /// Directory under the user config dir
    pub const APP_DIR: &str = "xposed-installer";

    /// Config file name
    pub const FILENAME: &str = "config.json";
}

/// Value reported when the framework is not active in this process
pub const ACTIVE_FRAMEWORK_VERSION_UNHOOKED: i32 = -1;
