//! Multipart boundary discovery from the Content-Type header.

/// Boundary token assumed when the header does not carry one.
pub const DEFAULT_BOUNDARY: &str = "frame";

/// Whether a Content-Type announces a multipart body.
pub fn is_multipart(content_type: &str) -> bool {
    content_type.trim_start().to_ascii_lowercase().starts_with("multipart/")
}

/// Extract the `boundary=` parameter from a Content-Type value.
///
/// Accepts quoted and unquoted forms; the parameter key is matched
/// case-insensitively. Returns `None` when the header has no boundary,
/// in which case callers fall back to [`DEFAULT_BOUNDARY`].
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    for param in content_type.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("boundary") {
            continue;
        }
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            return None;
        }
        return Some(value.to_string());
    }
    None
}
