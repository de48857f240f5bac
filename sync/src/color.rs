//! Stable presence colors derived from user identity.
//!
//! Colors are not carried on the wire; every peer derives the same color
//! from the same user id, so cursors look identical everywhere without any
//! coordination.

/// Palette for remote cursors.
const PALETTE: [&str; 8] = [
    "#D94B4B", "#E8883D", "#D9C23A", "#4BAE6B", "#3D94E8", "#7A6BE8", "#C95FD0", "#E8628E",
];

/// Pick the palette color for a user id. The same id always maps to the
/// same color.
#[must_use]
pub fn color_for_user(user_id: &str) -> &'static str {
    let sum: usize = user_id.bytes().map(usize::from).sum();
    PALETTE[sum % PALETTE.len()]
}
