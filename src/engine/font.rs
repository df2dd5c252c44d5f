//! Built-in 5x7 bitmap face covering printable ASCII.

use super::{MAX_COORD, alloc_samples, check_size};
use crate::error::Result;
use crate::types::Align;

pub(crate) const GLYPH_WIDTH: u32 = 5;
pub(crate) const GLYPH_HEIGHT: u32 = 7;
/// Horizontal advance, including one column of spacing.
pub(crate) const ADVANCE: u32 = GLYPH_WIDTH + 1;
/// Line pitch, including one row of spacing.
pub(crate) const LINE_HEIGHT: u32 = GLYPH_HEIGHT + 1;

/// Column-major glyphs for `' '..='~'`; bit 0 is the top row.
#[rustfmt::skip]
const GLYPHS: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], [0x00, 0x00, 0x5F, 0x00, 0x00], [0x00, 0x07, 0x00, 0x07, 0x00],
    [0x14, 0x7F, 0x14, 0x7F, 0x14], [0x24, 0x2A, 0x7F, 0x2A, 0x12], [0x23, 0x13, 0x08, 0x64, 0x62],
    [0x36, 0x49, 0x56, 0x20, 0x50], [0x00, 0x05, 0x03, 0x00, 0x00], [0x00, 0x1C, 0x22, 0x41, 0x00],
    [0x00, 0x41, 0x22, 0x1C, 0x00], [0x14, 0x08, 0x3E, 0x08, 0x14], [0x08, 0x08, 0x3E, 0x08, 0x08],
    [0x00, 0x50, 0x30, 0x00, 0x00], [0x08, 0x08, 0x08, 0x08, 0x08], [0x00, 0x60, 0x60, 0x00, 0x00],
    [0x20, 0x10, 0x08, 0x04, 0x02], [0x3E, 0x51, 0x49, 0x45, 0x3E], [0x00, 0x42, 0x7F, 0x40, 0x00],
    [0x42, 0x61, 0x51, 0x49, 0x46], [0x21, 0x41, 0x45, 0x4B, 0x31], [0x18, 0x14, 0x12, 0x7F, 0x10],
    [0x27, 0x45, 0x45, 0x45, 0x39], [0x3C, 0x4A, 0x49, 0x49, 0x30], [0x01, 0x71, 0x09, 0x05, 0x03],
    [0x36, 0x49, 0x49, 0x49, 0x36], [0x06, 0x49, 0x49, 0x29, 0x1E], [0x00, 0x36, 0x36, 0x00, 0x00],
    [0x00, 0x56, 0x36, 0x00, 0x00], [0x08, 0x14, 0x22, 0x41, 0x00], [0x14, 0x14, 0x14, 0x14, 0x14],
    [0x00, 0x41, 0x22, 0x14, 0x08], [0x02, 0x01, 0x51, 0x09, 0x06], [0x32, 0x49, 0x79, 0x41, 0x3E],
    [0x7E, 0x11, 0x11, 0x11, 0x7E], [0x7F, 0x49, 0x49, 0x49, 0x36], [0x3E, 0x41, 0x41, 0x41, 0x22],
    [0x7F, 0x41, 0x41, 0x22, 0x1C], [0x7F, 0x49, 0x49, 0x49, 0x41], [0x7F, 0x09, 0x09, 0x09, 0x01],
    [0x3E, 0x41, 0x49, 0x49, 0x7A], [0x7F, 0x08, 0x08, 0x08, 0x7F], [0x00, 0x41, 0x7F, 0x41, 0x00],
    [0x20, 0x40, 0x41, 0x3F, 0x01], [0x7F, 0x08, 0x14, 0x22, 0x41], [0x7F, 0x40, 0x40, 0x40, 0x40],
    [0x7F, 0x02, 0x0C, 0x02, 0x7F], [0x7F, 0x04, 0x08, 0x10, 0x7F], [0x3E, 0x41, 0x41, 0x41, 0x3E],
    [0x7F, 0x09, 0x09, 0x09, 0x06], [0x3E, 0x41, 0x51, 0x21, 0x5E], [0x7F, 0x09, 0x19, 0x29, 0x46],
    [0x46, 0x49, 0x49, 0x49, 0x31], [0x01, 0x01, 0x7F, 0x01, 0x01], [0x3F, 0x40, 0x40, 0x40, 0x3F],
    [0x1F, 0x20, 0x40, 0x20, 0x1F], [0x3F, 0x40, 0x38, 0x40, 0x3F], [0x63, 0x14, 0x08, 0x14, 0x63],
    [0x07, 0x08, 0x70, 0x08, 0x07], [0x61, 0x51, 0x49, 0x45, 0x43], [0x00, 0x7F, 0x41, 0x41, 0x00],
    [0x02, 0x04, 0x08, 0x10, 0x20], [0x00, 0x41, 0x41, 0x7F, 0x00], [0x04, 0x02, 0x01, 0x02, 0x04],
    [0x40, 0x40, 0x40, 0x40, 0x40], [0x00, 0x01, 0x02, 0x04, 0x00], [0x20, 0x54, 0x54, 0x54, 0x78],
    [0x7F, 0x48, 0x44, 0x44, 0x38], [0x38, 0x44, 0x44, 0x44, 0x20], [0x38, 0x44, 0x44, 0x48, 0x7F],
    [0x38, 0x54, 0x54, 0x54, 0x18], [0x08, 0x7E, 0x09, 0x01, 0x02], [0x0C, 0x52, 0x52, 0x52, 0x3E],
    [0x7F, 0x08, 0x04, 0x04, 0x78], [0x00, 0x44, 0x7D, 0x40, 0x00], [0x20, 0x40, 0x44, 0x3D, 0x00],
    [0x7F, 0x10, 0x28, 0x44, 0x00], [0x00, 0x41, 0x7F, 0x40, 0x00], [0x7C, 0x04, 0x18, 0x04, 0x78],
    [0x7C, 0x08, 0x04, 0x04, 0x78], [0x38, 0x44, 0x44, 0x44, 0x38], [0x7C, 0x14, 0x14, 0x14, 0x08],
    [0x08, 0x14, 0x14, 0x18, 0x7C], [0x7C, 0x08, 0x04, 0x04, 0x08], [0x48, 0x54, 0x54, 0x54, 0x20],
    [0x04, 0x3F, 0x44, 0x40, 0x20], [0x3C, 0x40, 0x40, 0x20, 0x7C], [0x1C, 0x20, 0x40, 0x20, 0x1C],
    [0x3C, 0x40, 0x30, 0x40, 0x3C], [0x44, 0x28, 0x10, 0x28, 0x44], [0x0C, 0x50, 0x50, 0x50, 0x3C],
    [0x44, 0x64, 0x54, 0x4C, 0x44], [0x00, 0x08, 0x36, 0x41, 0x00], [0x00, 0x00, 0x7F, 0x00, 0x00],
    [0x00, 0x41, 0x36, 0x08, 0x00], [0x10, 0x08, 0x08, 0x10, 0x08],
];

/// Glyph columns for `c`; characters outside the face render as `?`.
pub(crate) fn glyph(c: char) -> [u8; 5] {
    let index = match c {
        ' '..='~' => c as usize - ' ' as usize,
        _ => '?' as usize - ' ' as usize,
    };
    GLYPHS[index]
}

/// Whether the glyph pixel at column `x`, row `y` is set.
pub(crate) fn is_set(c: char, x: u32, y: u32) -> bool {
    x < GLYPH_WIDTH && y < GLYPH_HEIGHT && glyph(c)[x as usize] & (1 << y) != 0
}

/// Greedy word wrap to at most `max_chars` characters per line.
pub(crate) fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split(' ') {
            let word_len = word.chars().count();
            let line_len = line.chars().count();
            if line_len > 0 && line_len + 1 + word_len > max_chars {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
            while line.chars().count() > max_chars {
                let head: String = line.chars().take(max_chars).collect();
                line = line.chars().skip(max_chars).collect();
                lines.push(head);
            }
        }
        lines.push(line);
    }
    lines
}

/// Coverage mask of `text` laid out in a box `box_width` pixels wide.
///
/// Returns `(width, height, mask)`; `mask` holds one 0/1 value per pixel.
/// Fails when the mask would exceed the image size limit.
pub(crate) fn render(text: &str, scale: u32, box_width: u32, align: Align) -> Result<(u32, u32, Vec<f32>)> {
    let scale = scale.clamp(1, MAX_COORD / LINE_HEIGHT + 1);
    let per_line = (box_width / (ADVANCE * scale)).max(1) as usize;
    let lines = wrap(text, per_line);
    let width = box_width.max(ADVANCE * scale);
    let height = u32::try_from(lines.len() as u64 * u64::from(LINE_HEIGHT * scale))
        .unwrap_or(u32::MAX)
        .max(1);
    let mut mask = alloc_samples(check_size(width, height, 1)?)?;

    for (row, line) in lines.iter().enumerate() {
        let line_width = (line.chars().count() as u32 * ADVANCE * scale).saturating_sub(scale);
        let indent = match align {
            Align::Low => 0,
            Align::Centre => width.saturating_sub(line_width) / 2,
            Align::High => width.saturating_sub(line_width),
        };
        let top = row as u32 * LINE_HEIGHT * scale;
        for (i, c) in line.chars().enumerate() {
            let left = indent + i as u32 * ADVANCE * scale;
            for gy in 0..GLYPH_HEIGHT * scale {
                for gx in 0..GLYPH_WIDTH * scale {
                    let (x, y) = (left + gx, top + gy);
                    if x < width && is_set(c, gx / scale, gy / scale) {
                        mask[y as usize * width as usize + x as usize] = 1.0;
                    }
                }
            }
        }
    }
    Ok((width, height, mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_lookup() {
        assert_eq!(glyph(' '), [0; 5]);
        assert_eq!(glyph('A'), [0x7E, 0x11, 0x11, 0x11, 0x7E]);
        assert_eq!(glyph('é'), glyph('?'));
        // Vertical bar of 'I'
        assert!((0..7).all(|y| is_set('I', 2, y)));
    }

    #[test]
    fn wrap_on_words() {
        assert_eq!(wrap("hello big world", 9), vec!["hello big", "world"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap("one\ntwo", 20), vec!["one", "two"]);
    }

    #[test]
    fn render_aligns() {
        let (w, h, left) = render("I", 1, 30, Align::Low).unwrap();
        assert_eq!((w, h), (30, 8));
        let (_, _, right) = render("I", 1, 30, Align::High).unwrap();
        let first_set = |m: &[f32]| (0..w as usize).find(|&x| m[x] > 0.0).unwrap();
        assert!(first_set(&left) < 5);
        assert!(first_set(&right) > 25);
    }

    #[test]
    fn oversized_masks_are_refused() {
        assert!(render("wide", 1, MAX_COORD + 1, Align::Low).is_err());
        assert!(render("tall", u32::MAX, 10, Align::Low).is_err());
    }
}
