//! Screen lifecycle tracking and the progress indicator

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, trace};

use crate::dispatcher::UiDispatcher;
use crate::platform::{LoadStatus, RepoLoader, Screen};

/// Lifecycle callbacks a host forwards for each screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created,
    Started,
    Resumed,
    Paused,
    Stopped,
    SaveInstanceState,
    Destroyed,
}

#[derive(Default)]
struct TrackerState {
    ui_loaded: bool,
    foreground: Option<Weak<dyn Screen>>,
}

impl TrackerState {
    fn foreground(&self) -> Option<Arc<dyn Screen>> {
        self.foreground.as_ref().and_then(Weak::upgrade)
    }
}

pub struct LifecycleTracker {
    state: Arc<Mutex<TrackerState>>,
    repo_loader: Arc<dyn RepoLoader>,
    module_loader: Arc<dyn LoadStatus>,
    dispatcher: UiDispatcher,
}

fn lock(state: &Mutex<TrackerState>) -> MutexGuard<'_, TrackerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LifecycleTracker {
    pub fn new(
        repo_loader: Arc<dyn RepoLoader>,
        module_loader: Arc<dyn LoadStatus>,
        dispatcher: UiDispatcher,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            repo_loader,
            module_loader,
            dispatcher,
        }
    }

    /// Forward one lifecycle callback
    pub fn handle(&self, event: LifecycleEvent, screen: &Arc<dyn Screen>) {
        trace!(screen = screen.name(), ?event, "Lifecycle event");
        match event {
            LifecycleEvent::Created => self.created(),
            LifecycleEvent::Resumed => self.resumed(screen),
            LifecycleEvent::Paused => self.paused(screen),
            LifecycleEvent::Started
            | LifecycleEvent::Stopped
            | LifecycleEvent::SaveInstanceState
            | LifecycleEvent::Destroyed => {}
        }
    }

    /// First screen creation kicks off the repository load; later ones do nothing
    pub fn created(&self) {
        {
            let mut state = lock(&self.state);
            if state.ui_loaded {
                return;
            }
            state.ui_loaded = true;
        }

        info!("First screen created, triggering repository load");
        self.repo_loader.trigger_first_load_if_necessary();
    }

    pub fn resumed(&self, screen: &Arc<dyn Screen>) {
        lock(&self.state).foreground = Some(Arc::downgrade(screen));
        debug!(screen = screen.name(), "Screen in foreground");
        self.refresh_progress_indicator();
    }

    pub fn paused(&self, screen: &Arc<dyn Screen>) {
        screen.set_progress_visible(false);
        lock(&self.state).foreground = None;
        debug!(screen = screen.name(), "Screen left foreground");
    }

    /// Show the indicator on the foreground screen while either loader is busy
    ///
    /// Status is read on the calling thread; the update runs on the UI thread
    /// and is dropped if no screen is in the foreground by then.
    pub fn refresh_progress_indicator(&self) {
        let busy = self.repo_loader.is_loading() || self.module_loader.is_loading();
        let state = Arc::clone(&self.state);
        self.dispatcher.run_on_ui_thread(move || {
            let screen = lock(&state).foreground();
            if let Some(screen) = screen {
                trace!(screen = screen.name(), busy, "Updating progress indicator");
                screen.set_progress_visible(busy);
            }
        });
    }

    pub fn is_ui_loaded(&self) -> bool {
        lock(&self.state).ui_loaded
    }

    pub fn foreground_screen(&self) -> Option<Arc<dyn Screen>> {
        lock(&self.state).foreground()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::UiLoop;
    use crate::platform::FirstLoad;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct FakeLoader {
        loading: AtomicBool,
        first_loads: AtomicUsize,
    }

    impl LoadStatus for FakeLoader {
        fn is_loading(&self) -> bool {
            self.loading.load(Ordering::SeqCst)
        }
    }

    impl FirstLoad for FakeLoader {
        fn trigger_first_load_if_necessary(&self) {
            self.first_loads.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeScreen {
        updates: Mutex<Vec<bool>>,
    }

    impl FakeScreen {
        fn updates(&self) -> Vec<bool> {
            self.updates.lock().unwrap().clone()
        }
    }

    impl Screen for FakeScreen {
        fn name(&self) -> &str {
            "fake"
        }

        fn set_progress_visible(&self, visible: bool) {
            self.updates.lock().unwrap().push(visible);
        }
    }

    struct Harness {
        ui_loop: UiLoop,
        repo: Arc<FakeLoader>,
        modules: Arc<FakeLoader>,
        tracker: Arc<LifecycleTracker>,
    }

    fn harness() -> Harness {
        let (ui_loop, dispatcher) = UiLoop::new();
        let repo = Arc::new(FakeLoader::default());
        let modules = Arc::new(FakeLoader::default());
        let tracker = Arc::new(LifecycleTracker::new(
            repo.clone(),
            modules.clone(),
            dispatcher,
        ));
        Harness {
            ui_loop,
            repo,
            modules,
            tracker,
        }
    }

    fn screen() -> (Arc<FakeScreen>, Arc<dyn Screen>) {
        let concrete = Arc::new(FakeScreen::default());
        let handle: Arc<dyn Screen> = concrete.clone();
        (concrete, handle)
    }

    #[test]
    fn test_first_load_triggered_once() {
        let h = harness();
        let (_, s) = screen();
        assert!(!h.tracker.is_ui_loaded());

        h.tracker.handle(LifecycleEvent::Created, &s);
        h.tracker.handle(LifecycleEvent::Created, &s);
        h.tracker.handle(LifecycleEvent::Created, &s);

        assert!(h.tracker.is_ui_loaded());
        assert_eq!(h.repo.first_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resume_shows_busy_state() {
        let h = harness();
        let (fake, s) = screen();
        h.modules.loading.store(true, Ordering::SeqCst);

        h.tracker.handle(LifecycleEvent::Resumed, &s);

        assert_eq!(fake.updates(), vec![true]);
        assert!(h.tracker.foreground_screen().is_some());
    }

    #[test]
    fn test_pause_hides_indicator_and_clears_foreground() {
        let h = harness();
        let (fake, s) = screen();
        h.repo.loading.store(true, Ordering::SeqCst);

        h.tracker.handle(LifecycleEvent::Resumed, &s);
        h.tracker.handle(LifecycleEvent::Paused, &s);

        assert_eq!(fake.updates(), vec![true, false]);
        assert!(h.tracker.foreground_screen().is_none());
    }

    #[test]
    fn test_refresh_without_foreground_is_dropped() {
        let h = harness();
        let (fake, s) = screen();
        h.tracker.handle(LifecycleEvent::Resumed, &s);
        h.tracker.handle(LifecycleEvent::Paused, &s);

        h.tracker.refresh_progress_indicator();

        assert_eq!(fake.updates(), vec![false, false]);
    }

    #[test]
    fn test_refresh_from_background_runs_on_ui_loop() {
        let h = harness();
        let (fake, s) = screen();
        h.tracker.handle(LifecycleEvent::Resumed, &s);
        assert_eq!(fake.updates(), vec![false]);

        h.repo.loading.store(true, Ordering::SeqCst);
        let tracker = Arc::clone(&h.tracker);
        thread::spawn(move || tracker.refresh_progress_indicator())
            .join()
            .unwrap();
        assert_eq!(fake.updates(), vec![false]);

        assert_eq!(h.ui_loop.run_pending(), 1);
        assert_eq!(fake.updates(), vec![false, true]);
    }

    #[test]
    fn test_queued_refresh_targets_current_screen() {
        let h = harness();
        let (first, a) = screen();
        let (second, b) = screen();
        h.tracker.handle(LifecycleEvent::Resumed, &a);

        let tracker = Arc::clone(&h.tracker);
        thread::spawn(move || tracker.refresh_progress_indicator())
            .join()
            .unwrap();

        h.tracker.handle(LifecycleEvent::Paused, &a);
        h.tracker.handle(LifecycleEvent::Resumed, &b);
        h.ui_loop.run_pending();

        assert_eq!(first.updates(), vec![false, false]);
        assert_eq!(second.updates(), vec![false, false]);
    }

    #[test]
    fn test_dropped_screen_is_not_kept_alive() {
        let h = harness();
        let (fake, s) = screen();
        h.tracker.handle(LifecycleEvent::Resumed, &s);
        drop(s);
        drop(fake);

        assert!(h.tracker.foreground_screen().is_none());
        h.tracker.refresh_progress_indicator();
    }

    #[test]
    fn test_other_events_are_ignored() {
        let h = harness();
        let (fake, s) = screen();
        for event in [
            LifecycleEvent::Started,
            LifecycleEvent::Stopped,
            LifecycleEvent::SaveInstanceState,
            LifecycleEvent::Destroyed,
        ] {
            h.tracker.handle(event, &s);
        }

        assert!(fake.updates().is_empty());
        assert!(!h.tracker.is_ui_loaded());
        assert!(h.tracker.foreground_screen().is_none());
    }
}
