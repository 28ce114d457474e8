//! Extension rules — decide a file's [`Disposition`] and name its artifact.
//!
//! Pure string logic, no filesystem access.

use std::path::Path;

use crate::pipeline::types::Disposition;

/// Formats that are emailed as-is and converted.
pub const SOURCE_FORMATS: &[&str] = &["pdf", "epub"];

/// Lower-cased extension of `name`, without the dot.
///
/// `None` for names without one, including dot-files like `.hidden`.
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Classify `name` against the configured target format.
///
/// The target format is checked first, so a target that is also a source
/// format is never converted into itself.
pub fn classify(name: &str, target_format: &str) -> Disposition {
    match extension(name) {
        Some(ext) if ext == target_format => Disposition::AlreadyTarget,
        Some(ext) if SOURCE_FORMATS.contains(&ext.as_str()) => Disposition::DeliverAndConvert,
        _ => Disposition::Ignore,
    }
}

/// Deterministic artifact name: `<base>_<origext>.<target>`.
pub fn artifact_name(name: &str, target_format: &str) -> String {
    let path = Path::new(name);
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = extension(name).unwrap_or_default();
    format!("{base}_{ext}.{target_format}")
}
