// Settings module
// JSON settings file with environment overrides, read once at startup

#[allow(clippy::module_inception)]
pub mod settings;

pub use settings::AppSettings;
