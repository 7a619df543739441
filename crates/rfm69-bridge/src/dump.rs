//! Hex/ASCII rendering of buffers that could not be decoded

use std::fmt::Write;
use tracing::warn;

/// Maximum number of values rendered per line
pub const MAX_VALUES_PER_LINE: usize = 16;

/// Render `data` as hex/ASCII lines
///
/// Each line is `"NNNN: HH HH ..    ascii"` where `NNNN` is the line index in
/// hex. The hex column is padded to the full line width so the ASCII column
/// stays aligned on a short final line. Bytes outside `0x20..=0x7E` show as
/// `.` in the ASCII column. Empty input renders nothing, not even the
/// description.
pub fn hex_dump(description: Option<&str>, data: &[u8], values_per_line: usize) -> Vec<String> {
    if data.is_empty() {
        return Vec::new();
    }

    let width = values_per_line.clamp(1, MAX_VALUES_PER_LINE);
    let mut lines = Vec::with_capacity(data.len() / width + 2);

    if let Some(desc) = description {
        lines.push(format!("{}:", desc));
    }

    for (index, chunk) in data.chunks(width).enumerate() {
        let mut hex = String::with_capacity(width * 3);
        let mut ascii = String::with_capacity(width);

        for &byte in chunk {
            // Writing into a String cannot fail
            let _ = write!(hex, "{:02X} ", byte);
            ascii.push(if (0x20..=0x7E).contains(&byte) {
                byte as char
            } else {
                '.'
            });
        }

        lines.push(format!("{:04x}: {:<pad$}   {}", index, hex, ascii, pad = width * 3));
    }

    lines
}

/// Emit a hex dump through the log at warn level
pub fn log_hex_dump(description: Option<&str>, data: &[u8], values_per_line: usize) {
    for line in hex_dump(description, data, values_per_line) {
        warn!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(hex_dump(Some("nothing"), &[], 16).is_empty());
    }

    #[test]
    fn test_single_full_line() {
        let lines = hex_dump(None, b"ABCD", 4);
        assert_eq!(lines, vec!["0000: 41 42 43 44    ABCD".to_string()]);
    }

    #[test]
    fn test_description_and_padding() {
        let lines = hex_dump(Some("Bad packet"), &[0x00, 0x41, 0x7F, 0x20, 0xFF], 4);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Bad packet:");
        assert_eq!(lines[1], "0000: 00 41 7F 20    .A. ");
        // Short last line keeps the ASCII column aligned
        assert_eq!(lines[2], "0001: FF             .");
        assert_eq!(lines[1].find("   .A"), lines[2].find("   ."));
    }

    #[test]
    fn test_line_index_counts_lines() {
        let data: Vec<u8> = (0..40).collect();
        let lines = hex_dump(None, &data, 16);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("0000: "));
        assert!(lines[1].starts_with("0001: "));
        assert!(lines[2].starts_with("0002: "));
    }

    #[test]
    fn test_width_clamped() {
        let data = [0x30u8; 40];
        let lines = hex_dump(None, &data, 64);
        assert_eq!(lines.len(), 3);

        let narrow = hex_dump(None, &[1, 2, 3], 0);
        assert_eq!(narrow.len(), 3);
    }
}
