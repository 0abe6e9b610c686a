//! Configuration and persisted state
//!
//! - **settings**: where the shell keeps its files (JSON, optional)
//! - **preferences**: persisted installer settings and one-time flags
//! - **registry**: framework properties plus startup housekeeping

pub mod preferences;
pub mod registry;
pub mod settings;

pub use preferences::{Editor, Preferences};
pub use registry::{active_framework_version, CleanupReport, ConfigRegistry};
pub use settings::AppConfig;
