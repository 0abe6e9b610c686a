//! Application context: startup sequence and shared handles

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, CleanupReport, ConfigRegistry, Preferences};
use crate::dispatcher::{UiDispatcher, UiLoop};
use crate::lifecycle::LifecycleTracker;
use crate::platform::{LoadStatus, Platform, RepoLoader};
use crate::props::PropertyMap;

/// What happened during [`App::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    pub property_count: usize,
    pub directories_ready: usize,
    pub cleanups: CleanupReport,
    pub static_busybox: bool,
}

/// Everything the installer shares between its screens and loaders
pub struct App {
    config: AppConfig,
    platform: Arc<dyn Platform>,
    registry: Arc<ConfigRegistry>,
    tracker: Arc<LifecycleTracker>,
    dispatcher: UiDispatcher,
    report: StartupReport,
}

impl App {
    /// Bring the installer up on the current thread, which becomes the UI thread
    ///
    /// The returned [`UiLoop`] must be driven by the caller on this thread.
    pub fn start(
        config: AppConfig,
        platform: Arc<dyn Platform>,
        repo_loader: Arc<dyn RepoLoader>,
        module_loader: Arc<dyn LoadStatus>,
    ) -> (Self, UiLoop) {
        let (ui_loop, dispatcher) = UiLoop::new();

        let preferences = Preferences::open(config.resolved_prefs_file());
        let registry = Arc::new(ConfigRegistry::new(
            &config.base_dir,
            &config.prop_file,
            preferences,
        ));

        registry.initialize();
        let directories_ready = registry.ensure_directories();
        let external_storage = platform.external_storage_root();
        let cleanups = registry.run_one_time_cleanups(external_storage.as_deref());

        platform.init_notifications();
        let static_busybox = platform.check_static_busybox();
        if !static_busybox {
            warn!("Static busybox not available");
        }
        platform.remove_busybox();

        let tracker = Arc::new(LifecycleTracker::new(
            repo_loader,
            module_loader,
            dispatcher.clone(),
        ));

        let report = StartupReport {
            property_count: registry.properties().len(),
            directories_ready,
            cleanups,
            static_busybox,
        };
        info!(
            base_dir = %config.base_dir.display(),
            properties = report.property_count,
            directories = report.directories_ready,
            "Installer started"
        );

        let app = Self {
            config,
            platform,
            registry,
            tracker,
            dispatcher,
            report,
        };
        (app, ui_loop)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<LifecycleTracker> {
        &self.tracker
    }

    pub fn dispatcher(&self) -> &UiDispatcher {
        &self.dispatcher
    }

    pub fn properties(&self) -> Arc<PropertyMap> {
        self.registry.properties()
    }

    pub fn preferences(&self) -> &Preferences {
        self.registry.preferences()
    }

    pub fn downloads_enabled(&self) -> bool {
        self.registry.downloads_enabled(self.platform.as_ref())
    }

    pub fn startup_report(&self) -> StartupReport {
        self.report
    }

    /// Flush preferences and release the context
    pub fn shutdown(self) -> Result<()> {
        self.preferences()
            .flush()
            .context("Failed to flush preferences on shutdown")?;
        self.dispatcher.quit();
        info!("Installer shut down");
        Ok(())
    }
}
