//! Minimal EXIF reader and writer for the orientation tag.
//!
//! Reads tag 0x0112 from IFD0 of the TIFF structure embedded in a JPEG APP1
//! `Exif\0\0` segment, or from a bare TIFF file. Writing either rewrites
//! the orientation entry of an existing block or produces the smallest APP1
//! segment that carries a single orientation entry.

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const ORIENTATION_TAG: u16 = 0x0112;
const TYPE_SHORT: u16 = 3;

/// Orientation tag from a JPEG or TIFF buffer, if present and in 1..=8.
pub fn read_orientation(data: &[u8]) -> Option<u16> {
    let tiff = if data.starts_with(&[0xFF, 0xD8]) {
        find_jpeg_exif(data)?
    } else {
        data
    };
    tiff_orientation(tiff).filter(|o| (1..=8).contains(o))
}

/// The TIFF payload of a JPEG's APP1 Exif segment.
pub fn find_jpeg_exif(data: &[u8]) -> Option<&[u8]> {
    // Skip SOI
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // Markers without length field
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        // SOS (0xDA) means image data starts, EOI ends the file
        if marker == 0xDA || marker == 0xD9 {
            return None;
        }

        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if seg_len < 2 {
            return None;
        }
        let seg_start = pos + 4;
        let seg_end = (pos + 2 + seg_len).min(data.len());

        if marker == 0xE1 && data[seg_start..seg_end].starts_with(EXIF_HEADER) {
            return Some(&data[seg_start + EXIF_HEADER.len()..seg_end]);
        }
        pos += 2 + seg_len;
    }
    None
}

/// Byte-order aware view over a TIFF structure.
struct Tiff<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl<'a> Tiff<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }
        let big_endian = match &data[0..2] {
            b"MM" => true,
            b"II" => false,
            _ => return None,
        };
        let tiff = Tiff { data, big_endian };
        // TIFF magic (42)
        (tiff.u16_at(2)? == 42).then_some(tiff)
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        let bytes = [*self.data.get(offset)?, *self.data.get(offset + 1)?];
        Some(if self.big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(offset..offset + 4)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    fn u16_bytes(&self, value: u16) -> [u8; 2] {
        if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() }
    }

    fn u32_bytes(&self, value: u32) -> [u8; 4] {
        if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() }
    }

    /// Offset of IFD0 and its entry count.
    fn ifd0(&self) -> Option<(usize, usize)> {
        let offset = self.u32_at(4)? as usize;
        Some((offset, self.u16_at(offset)? as usize))
    }

    /// Offset of the IFD0 entry carrying `tag`.
    fn entry(&self, tag: u16) -> Option<usize> {
        let (ifd, count) = self.ifd0()?;
        (0..count)
            .map(|i| ifd + 2 + i * 12)
            .find(|&entry| self.u16_at(entry) == Some(tag))
    }
}

/// Walk IFD0 of a TIFF structure looking for the orientation entry.
fn tiff_orientation(data: &[u8]) -> Option<u16> {
    let tiff = Tiff::parse(data)?;
    let entry = tiff.entry(ORIENTATION_TAG)?;
    // SHORT values are stored left-justified in the value field
    match tiff.u16_at(entry + 2)? {
        TYPE_SHORT => tiff.u16_at(entry + 8),
        _ => tiff.u32_at(entry + 8).and_then(|v| u16::try_from(v).ok()),
    }
}

/// Copy of a TIFF-structured EXIF block with its orientation entry rewritten.
///
/// `Some(o)` stores `o` in an existing orientation entry; a block without one
/// is returned unchanged. `None` removes the entry from IFD0. Unparseable
/// blocks are copied as they are.
pub fn rewrite_orientation(data: &[u8], orientation: Option<u16>) -> Vec<u8> {
    let mut out = data.to_vec();
    let Some(tiff) = Tiff::parse(data) else {
        return out;
    };
    let Some(entry) = tiff.entry(ORIENTATION_TAG) else {
        return out;
    };
    let value = entry + 8;
    if value + 4 > out.len() {
        return out;
    }
    match orientation {
        Some(o) if tiff.u16_at(entry + 2) == Some(TYPE_SHORT) => {
            out[value..value + 2].copy_from_slice(&tiff.u16_bytes(o));
            out[value + 2..value + 4].fill(0);
        }
        Some(o) => out[value..value + 4].copy_from_slice(&tiff.u32_bytes(u32::from(o))),
        None => {
            let Some((ifd, count)) = tiff.ifd0() else {
                return out;
            };
            // Entries after the removed one and the next-IFD offset move up
            let tail_end = ifd + 2 + count * 12 + 4;
            if tail_end > out.len() {
                return out;
            }
            out.copy_within(entry + 12..tail_end, entry);
            out[tail_end - 12..tail_end].fill(0);
            out[ifd..ifd + 2].copy_from_slice(&tiff.u16_bytes((count - 1) as u16));
        }
    }
    out
}

/// APP1 payload for a TIFF-structured EXIF block.
pub fn exif_payload(tiff: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(EXIF_HEADER.len() + tiff.len());
    payload.extend_from_slice(EXIF_HEADER);
    payload.extend_from_slice(tiff);
    payload
}

/// APP1 payload (`Exif\0\0` + big-endian TIFF) holding only an orientation.
pub fn orientation_payload(orientation: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(EXIF_HEADER.len() + 26);
    payload.extend_from_slice(EXIF_HEADER);
    // Header: byte order, magic, offset of IFD0
    payload.extend_from_slice(b"MM\x00\x2A");
    payload.extend_from_slice(&8u32.to_be_bytes());
    // IFD0 with one entry
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.extend_from_slice(&ORIENTATION_TAG.to_be_bytes());
    payload.extend_from_slice(&TYPE_SHORT.to_be_bytes());
    payload.extend_from_slice(&1u32.to_be_bytes());
    payload.extend_from_slice(&orientation.to_be_bytes());
    payload.extend_from_slice(&[0, 0]);
    // No next IFD
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload
}

/// Insert an APP1 segment right after the SOI marker of `jpeg`.
///
/// Returns `None` when `jpeg` does not start with SOI or the payload does not
/// fit in a segment.
pub fn insert_jpeg_app1(jpeg: &[u8], payload: &[u8]) -> Option<Vec<u8>> {
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let seg_len = u16::try_from(payload.len() + 2).ok()?;
    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&seg_len.to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&jpeg[2..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SOI, an APP0 segment, then EOI.
    fn bare_jpeg() -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x07, b'J', b'F', b'I', b'F', 0x00]);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn no_exif_segment() {
        assert_eq!(read_orientation(&bare_jpeg()), None);
    }

    #[test]
    fn written_orientation_reads_back() {
        for orientation in 1..=8 {
            let jpeg = insert_jpeg_app1(&bare_jpeg(), &orientation_payload(orientation)).unwrap();
            assert_eq!(read_orientation(&jpeg), Some(orientation));
        }
    }

    #[test]
    fn little_endian_tiff() {
        let mut tiff = b"II\x2A\x00".to_vec();
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend_from_slice(&2u16.to_le_bytes());
        // ImageWidth, LONG
        tiff.extend_from_slice(&0x0100u16.to_le_bytes());
        tiff.extend_from_slice(&4u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&640u32.to_le_bytes());
        // Orientation, SHORT
        tiff.extend_from_slice(&0x0112u16.to_le_bytes());
        tiff.extend_from_slice(&3u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&[6, 0, 0, 0]);
        tiff.extend_from_slice(&0u32.to_le_bytes());

        assert_eq!(read_orientation(&tiff), Some(6));
    }

    #[test]
    fn out_of_range_orientation_ignored() {
        let jpeg = insert_jpeg_app1(&bare_jpeg(), &orientation_payload(9)).unwrap();
        assert_eq!(read_orientation(&jpeg), None);
    }

    #[test]
    fn truncated_segment_does_not_panic() {
        let jpeg = insert_jpeg_app1(&bare_jpeg(), &orientation_payload(3)).unwrap();
        for len in 0..jpeg.len() {
            let _ = read_orientation(&jpeg[..len]);
        }
    }

    /// Big-endian IFD0 with Make ("Pix") then Orientation, then a next-IFD offset.
    fn camera_tiff(orientation: u16) -> Vec<u8> {
        let mut tiff = b"MM\x00\x2A".to_vec();
        tiff.extend_from_slice(&8u32.to_be_bytes());
        tiff.extend_from_slice(&2u16.to_be_bytes());
        // Make, ASCII, 4 bytes inline
        tiff.extend_from_slice(&0x010Fu16.to_be_bytes());
        tiff.extend_from_slice(&2u16.to_be_bytes());
        tiff.extend_from_slice(&4u32.to_be_bytes());
        tiff.extend_from_slice(b"Pix\0");
        tiff.extend_from_slice(&ORIENTATION_TAG.to_be_bytes());
        tiff.extend_from_slice(&TYPE_SHORT.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0u32.to_be_bytes());
        tiff
    }

    #[test]
    fn rewrite_patches_orientation_in_place() {
        let tiff = camera_tiff(6);
        let upright = rewrite_orientation(&tiff, Some(1));
        assert_eq!(upright.len(), tiff.len());
        assert_eq!(tiff_orientation(&upright), Some(1));
        assert_eq!(&upright[18..22], b"Pix\0");
    }

    #[test]
    fn rewrite_can_drop_orientation() {
        let tiff = camera_tiff(6);
        let dropped = rewrite_orientation(&tiff, None);
        assert_eq!(tiff_orientation(&dropped), None);
        let parsed = Tiff::parse(&dropped).unwrap();
        assert_eq!(parsed.ifd0(), Some((8, 1)));
        assert_eq!(parsed.u16_at(10), Some(0x010F));
        // Next-IFD offset follows the single remaining entry
        assert_eq!(parsed.u32_at(22), Some(0));
    }

    #[test]
    fn rewrite_leaves_other_blocks_alone() {
        assert_eq!(rewrite_orientation(b"garbage", Some(3)), b"garbage".to_vec());
        let mut no_orientation = b"II\x2A\x00".to_vec();
        no_orientation.extend_from_slice(&8u32.to_le_bytes());
        no_orientation.extend_from_slice(&0u16.to_le_bytes());
        no_orientation.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(rewrite_orientation(&no_orientation, Some(3)), no_orientation);
    }

    #[test]
    fn exif_payload_round_trips_through_jpeg() {
        let jpeg = insert_jpeg_app1(&bare_jpeg(), &exif_payload(&camera_tiff(8))).unwrap();
        assert_eq!(read_orientation(&jpeg), Some(8));
        assert_eq!(find_jpeg_exif(&jpeg), Some(&camera_tiff(8)[..]));
    }

    #[test]
    fn insert_requires_soi() {
        assert!(insert_jpeg_app1(b"\x89PNG", &orientation_payload(1)).is_none());
    }
}
