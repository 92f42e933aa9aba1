//! Configuration: application settings and per-source options.

mod options;
mod settings;

pub use options::SourceOptions;
pub use settings::Settings;

/// Application directory name under the platform data dir.
pub const APP_DIR_NAME: &str = "mirror-fetch";

/// Environment variable overriding the user-data root.
pub const USER_DATA_ENV: &str = "MIRROR_FETCH_USER_DATA";

/// Parse a boolean-ish environment value (`1`, `true`, `on`, `yes`).
pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
