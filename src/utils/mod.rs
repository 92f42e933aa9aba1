//! Shared utility functions.
//!
//! - `mime`: content-type detection for fetched and cached assets
//! - `script_vars`: variable extraction from inline script text

pub mod mime;
pub mod script_vars;

pub use mime::{detect_content_type, extension_for, is_image};
pub use script_vars::{extract_variable, ScriptValue};
