//! Shared types for the Quickframe query memory.

mod dataset;
mod fingerprint;
mod memory;
mod result;

pub use dataset::*;
pub use fingerprint::*;
pub use memory::*;
pub use result::*;

/// Return the prefix of `text` holding at most `max_chars` characters.
///
/// Slices on a char boundary, so multi-byte text never panics.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
