//! Line framing helpers.

/// Default upper bound for a single line, in bytes, including the terminator.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Strips one trailing `\n` or `\r\n` from a line.
///
/// Only the terminator is removed; other trailing whitespace belongs to the
/// message.
pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
