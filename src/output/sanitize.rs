//! Sheet-name sanitization.

/// Characters replaced by [`sanitize`].
pub const ILLEGAL_CHARS: [char; 7] = ['\\', '/', '*', '?', ':', '[', ']'];

/// Replace every character in [`ILLEGAL_CHARS`] with `_`.
///
/// Total and idempotent. Other characters pass through unchanged, including ones some
/// filesystems still reject (`<`, `>`, `|`, `"`, control characters, trailing dots); this is not
/// a full portability guarantee.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
