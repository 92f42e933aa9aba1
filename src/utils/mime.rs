//! Content-type detection for binary assets.

/// Strip parameters (`; charset=...`) and lowercase a content type.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

/// Detect the content type of `data`.
///
/// Magic numbers win; then the transport's header; then the URL extension.
/// Returns `None` when nothing is conclusive.
pub fn detect_content_type(data: &[u8], header: Option<&str>, url: Option<&str>) -> Option<String> {
    if let Some(kind) = infer::get(data) {
        return Some(kind.mime_type().to_string());
    }

    if let Some(header) = header {
        let header = essence(header);
        if !header.is_empty() && header != "application/octet-stream" {
            return Some(header);
        }
    }

    let url = url?;
    let path = url.split(['?', '#']).next().unwrap_or(url);
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
}

/// Whether a content type denotes an image.
pub fn is_image(content_type: &str) -> bool {
    essence(content_type).starts_with("image/")
}

/// File extension for an asset, from its magic number or else its content type.
pub fn extension_for(data: &[u8], content_type: &str) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.extension().to_string();
    }
    match essence(content_type).as_str() {
        "image/jpeg" => "jpg".to_string(),
        "image/svg+xml" => "svg".to_string(),
        other => other
            .rsplit('/')
            .next()
            .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin")
            .to_string(),
    }
}
