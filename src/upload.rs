//! Upload file name handling

/// Lowercase extension of a client-supplied file name
///
/// Only the final path component counts, and leading dots are ignored so a
/// bare dotfile such as `.txt` has no extension.
pub fn extension_of(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
        .trim()
        .trim_start_matches('.');

    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}
