//! Normalization of free-text names into key-safe path segments.

/// Characters that separate words and turn into a hyphen.
const SEPARATORS: &[char] = &['-', '_', '/', '\\', '|', '.', ',', ':', ';', '+'];

/// Turn a show or season name into a slug.
///
/// Lower-cases, maps whitespace and separators to a single hyphen, strips any
/// other non-alphanumeric character, collapses repeated hyphens and trims them
/// at both ends. Letters and digits of any script survive. The output only
/// holds lowercase alphanumerics and inner single hyphens, so it never
/// contains `/` and `sanitise(sanitise(x)) == sanitise(x)`.
///
/// Empty or punctuation-only input gives `""`; callers reject it.
pub fn sanitise(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else if c.is_whitespace() || SEPARATORS.contains(&c) {
            pending_hyphen = true;
        }
        // anything else is dropped without breaking the word
    }

    out
}

/// Normalize a free-text source tag for use inside a key leaf.
///
/// Trims, collapses whitespace, `/` and `\` runs into one hyphen and drops
/// control characters. Unlike [`sanitise`] it keeps case and punctuation, since
/// the tag is opaque provenance (`OpenSubtitles`, `fansub.v2`). Idempotent.
pub fn normalise_source(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars() {
        if c.is_whitespace() || c == '/' || c == '\\' {
            pending_hyphen = true;
        } else if !c.is_control() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        }
    }

    out
}
