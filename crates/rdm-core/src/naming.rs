//! Filename hints: URL path extraction and safe-for-disk sanitization.

/// Last path segment of a URL, sanitized, as a filename hint.
///
/// Returns `None` if the URL cannot be parsed, the path is empty/root, or
/// nothing usable survives sanitization.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    let name = sanitize_filename(segment);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Sanitizes a candidate filename for safe use on disk.
///
/// Path separators, whitespace, and control characters become `_`, runs of
/// `_` collapse, leading/trailing dots and spaces are trimmed, and the
/// result is capped at 255 bytes (NAME_MAX).
pub fn sanitize_filename(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let mapped = match c {
            '\0' | '/' | '\\' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        };
        if mapped == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(mapped);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.' || c == '_');
    if trimmed.len() <= NAME_MAX {
        return trimmed.to_string();
    }
    let mut take = NAME_MAX;
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}
