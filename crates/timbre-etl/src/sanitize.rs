//! Path-safe tokens from free-text metadata.

/// Characters that cannot appear in an object-store path segment.
const RESERVED: [char; 3] = ['/', ':', '?'];

/// Normalize a metadata field into a path segment.
///
/// Reserved characters at either edge are dropped together with the
/// whitespace around them; interior ones become `_`. Underscores already in
/// the field are kept. Never fails; `None` and blank input yield `""`.
#[must_use]
pub fn sanitize(field: Option<&str>) -> String {
    let Some(field) = field else {
        return String::new();
    };
    field
        .trim_matches(|c: char| c.is_whitespace() || RESERVED.contains(&c))
        .chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect()
}
