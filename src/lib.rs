//! Application shell of the Xposed installer
//!
//! Boots one [`app::App`] context per process: framework properties,
//! persisted preferences, working directories and one-time cleanups, plus
//! the screen lifecycle tracking that drives the progress indicator.

#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod lifecycle;
pub mod platform;
pub mod props;

pub use app::{App, StartupReport};
pub use dispatcher::{UiDispatcher, UiLoop};
pub use lifecycle::{LifecycleEvent, LifecycleTracker};
pub use props::{parse_properties, PropertyMap};
