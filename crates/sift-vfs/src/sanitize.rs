//! Archive member name sanitization.

use crate::path::SEPARATOR;

/// Normalize an archive member name before any lookup or filesystem use.
///
/// - backslashes become forward slashes
/// - leading slashes are stripped
/// - `.` and empty components are dropped
/// - `..` pops the previous component and never climbs above the root
/// - the virtual path separator is neutralized so a member name cannot
///   splice extra segments into a virtual path
pub fn sanitize_member_name(name: &str) -> String {
    let normalized = name.replace('\\', "/").replace(SEPARATOR, "__");

    let mut parts: Vec<&str> = Vec::new();
    for component in normalized.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
