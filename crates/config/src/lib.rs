//! Configuration for gridfeed
//!
//! One immutable [`Settings`] struct is the single source of truth for the
//! pipeline's knobs. It is loaded once at startup, from a JSON settings
//! file and/or environment overrides, and shared by value.

pub mod loader;
pub mod settings;

pub use loader::SettingsLoader;
pub use settings::Settings;
