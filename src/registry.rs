//! Image formats: magic-byte sniffing and the loader/saver capability table.
//!
//! The table is populated once, at startup, by asking the engine for a loader
//! and a saver under each format's lower-case name.

use crate::engine::codec;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Encoded image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ImageType {
    #[default]
    Unknown,
    Gif,
    Jpeg,
    Magick,
    Pdf,
    Png,
    Svg,
    Tiff,
    Webp,
    Heif,
    Bmp,
}

impl ImageType {
    pub const ALL: [ImageType; 10] = [
        ImageType::Gif,
        ImageType::Jpeg,
        ImageType::Magick,
        ImageType::Pdf,
        ImageType::Png,
        ImageType::Svg,
        ImageType::Tiff,
        ImageType::Webp,
        ImageType::Heif,
        ImageType::Bmp,
    ];

    /// Lower-case loader name.
    pub fn name(self) -> &'static str {
        match self {
            ImageType::Unknown => "unknown",
            ImageType::Gif => "gif",
            ImageType::Jpeg => "jpeg",
            ImageType::Magick => "magick",
            ImageType::Pdf => "pdf",
            ImageType::Png => "png",
            ImageType::Svg => "svg",
            ImageType::Tiff => "tiff",
            ImageType::Webp => "webp",
            ImageType::Heif => "heif",
            ImageType::Bmp => "bmp",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy)]
struct Capability {
    load: bool,
    save: bool,
}

static CAPABILITIES: OnceLock<BTreeMap<ImageType, Capability>> = OnceLock::new();

/// Populate the capability table. Later calls are no-ops.
pub(crate) fn init() {
    capabilities();
}

fn capabilities() -> &'static BTreeMap<ImageType, Capability> {
    CAPABILITIES.get_or_init(|| {
        ImageType::ALL
            .iter()
            .map(|&t| {
                let capability = Capability {
                    load: codec::find_loader(t.name()).is_some(),
                    save: codec::has_saver(t.name()),
                };
                (t, capability)
            })
            .collect()
    })
}

/// Whether the engine can decode `image_type`.
pub fn is_supported(image_type: ImageType) -> bool {
    capabilities()
        .get(&image_type)
        .is_some_and(|c| c.load)
}

/// Whether the engine can encode `image_type`.
pub fn is_save_supported(image_type: ImageType) -> bool {
    capabilities()
        .get(&image_type)
        .is_some_and(|c| c.save)
}

/// Canonical file extension including the dot, or `""` for unknown.
pub fn extension(image_type: ImageType) -> &'static str {
    match image_type {
        ImageType::Unknown => "",
        ImageType::Gif => ".gif",
        ImageType::Jpeg => ".jpeg",
        ImageType::Magick => ".magick",
        ImageType::Pdf => ".pdf",
        ImageType::Png => ".png",
        ImageType::Svg => ".svg",
        ImageType::Tiff => ".tiff",
        ImageType::Webp => ".webp",
        ImageType::Heif => ".heic",
        ImageType::Bmp => ".bmp",
    }
}

/// One-line `name(load/save)` listing for debug logs.
pub(crate) fn summary() -> String {
    capabilities()
        .iter()
        .map(|(t, c)| {
            let mode = match (c.load, c.save) {
                (true, true) => "load/save",
                (true, false) => "load",
                (false, true) => "save",
                (false, false) => "none",
            };
            format!("{t}({mode})")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

const HEIF_BRANDS: [&[u8]; 4] = [b"heic", b"mif1", b"msf1", b"avif"];

/// Identify an encoded buffer by its leading bytes.
pub fn sniff(buf: &[u8]) -> ImageType {
    if buf.len() < 12 {
        return ImageType::Unknown;
    }

    if buf.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return ImageType::Jpeg;
    }
    if buf.starts_with(b"GIF") {
        return ImageType::Gif;
    }
    if buf.starts_with(b"\x89PNG") {
        return ImageType::Png;
    }
    if buf.starts_with(b"II\x2A\x00") || buf.starts_with(b"MM\x00\x2A") {
        return ImageType::Tiff;
    }
    if buf.starts_with(b"%PDF") {
        return ImageType::Pdf;
    }
    if &buf[8..12] == b"WEBP" {
        return ImageType::Webp;
    }
    if buf.starts_with(b"<?xm") && has_svg_root(buf) {
        return ImageType::Svg;
    }
    if &buf[4..8] == b"ftyp" && HEIF_BRANDS.contains(&&buf[8..12]) {
        return ImageType::Heif;
    }
    if buf.starts_with(b"BM") {
        return ImageType::Bmp;
    }

    ImageType::Unknown
}

/// True when the first element of an XML document is `<svg>`.
///
/// The declared encoding is not honoured; element names are compared as raw
/// bytes so Latin-1 or UTF-16-declared files with ASCII markup still match.
fn has_svg_root(buf: &[u8]) -> bool {
    let mut reader = Reader::from_reader(buf);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return e.local_name().as_ref().eq_ignore_ascii_case(b"svg");
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(prefix: &[u8]) -> Vec<u8> {
        let mut buf = prefix.to_vec();
        buf.resize(32, 0);
        buf
    }

    #[test]
    fn short_buffers_are_unknown() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageType::Unknown);
        assert_eq!(sniff(b""), ImageType::Unknown);
    }

    #[test]
    fn magic_bytes() {
        assert_eq!(sniff(&padded(&[0xFF, 0xD8, 0xFF, 0xDB])), ImageType::Jpeg);
        assert_eq!(sniff(&padded(b"GIF89a")), ImageType::Gif);
        assert_eq!(sniff(&padded(b"\x89PNG\r\n\x1a\n")), ImageType::Png);
        assert_eq!(sniff(&padded(b"II\x2A\x00")), ImageType::Tiff);
        assert_eq!(sniff(&padded(b"MM\x00\x2A")), ImageType::Tiff);
        assert_eq!(sniff(&padded(b"%PDF-1.7")), ImageType::Pdf);
        assert_eq!(sniff(&padded(b"RIFF\x10\x00\x00\x00WEBPVP8 ")), ImageType::Webp);
        assert_eq!(sniff(&padded(b"BM\x36\x00")), ImageType::Bmp);
    }

    #[test]
    fn heif_brands() {
        for brand in [b"heic", b"mif1", b"msf1", b"avif"] {
            let mut buf = b"\x00\x00\x00\x18ftyp".to_vec();
            buf.extend_from_slice(brand);
            buf.resize(24, 0);
            assert_eq!(sniff(&buf), ImageType::Heif, "brand {:?}", brand);
        }
        let mut mp4 = b"\x00\x00\x00\x18ftypisom".to_vec();
        mp4.resize(24, 0);
        assert_eq!(sniff(&mp4), ImageType::Unknown);
    }

    #[test]
    fn svg_requires_svg_root() {
        let svg = br#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"/>"#;
        assert_eq!(sniff(svg), ImageType::Svg);

        let with_doctype = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<!DOCTYPE svg>\n<svg></svg>";
        assert_eq!(sniff(with_doctype), ImageType::Svg);

        let not_svg = b"<?xml version=\"1.0\"?><html><body/></html>";
        assert_eq!(sniff(not_svg), ImageType::Unknown);
    }

    #[test]
    fn first_rule_wins() {
        // A JPEG whose bytes 8..12 happen to read WEBP is still a JPEG.
        let buf = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, b'W', b'E', b'B', b'P'];
        assert_eq!(sniff(&buf), ImageType::Jpeg);
    }

    #[test]
    fn extensions() {
        assert_eq!(extension(ImageType::Jpeg), ".jpeg");
        assert_eq!(extension(ImageType::Heif), ".heic");
        assert_eq!(extension(ImageType::Unknown), "");
    }

    #[test]
    fn capability_table() {
        init();
        assert!(is_supported(ImageType::Jpeg));
        assert!(is_supported(ImageType::Png));
        assert!(is_supported(ImageType::Gif));
        assert!(!is_supported(ImageType::Bmp));
        assert!(!is_supported(ImageType::Pdf));
        assert!(!is_supported(ImageType::Unknown));
        assert!(is_save_supported(ImageType::Heif));
        assert!(!is_save_supported(ImageType::Svg));
    }

    #[test]
    fn display_is_loader_name() {
        assert_eq!(ImageType::Webp.to_string(), "webp");
        assert_eq!(ImageType::Magick.to_string(), "magick");
    }
}
