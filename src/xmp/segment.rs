use anyhow::Result;
use img_parts::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const EXIF_PREFIX: &[u8] = b"Exif\0\0";

/// Largest APP1 payload: the 16-bit segment length also counts its own two bytes.
const MAX_SEGMENT_CONTENTS: usize = u16::MAX as usize - 2;

/// Find the XMP APP1 segment position in a JPEG.
fn find_xmp_segment_pos(segments: &[JpegSegment]) -> Option<usize> {
    segments
        .iter()
        .position(|s| s.marker() == APP1 && s.contents().starts_with(XMP_HEADER))
}

fn find_exif_segment_pos(segments: &[JpegSegment]) -> Option<usize> {
    segments
        .iter()
        .position(|s| s.marker() == APP1 && s.contents().starts_with(EXIF_PREFIX))
}

/// The XMP packet text embedded in the JPEG, if any.
pub fn read_packet(jpeg: &Jpeg) -> Option<String> {
    let pos = find_xmp_segment_pos(jpeg.segments())?;
    let contents = jpeg.segments()[pos].contents();
    let xmp_bytes = &contents[XMP_HEADER.len()..];
    Some(String::from_utf8_lossy(xmp_bytes).into_owned())
}

/// Replace the XMP packet, or insert one after the EXIF APP1 segment (or after APP0).
pub fn write_packet(jpeg: &mut Jpeg, packet: &str) -> Result<()> {
    let len = XMP_HEADER.len() + packet.len();
    if len > MAX_SEGMENT_CONTENTS {
        anyhow::bail!("XMP packet of {len} bytes does not fit in a JPEG APP1 segment");
    }

    let mut contents = Vec::with_capacity(len);
    contents.extend_from_slice(XMP_HEADER);
    contents.extend_from_slice(packet.as_bytes());
    let new_segment = JpegSegment::new_with_contents(APP1, Bytes::from(contents));

    let segments = jpeg.segments_mut();
    if let Some(pos) = find_xmp_segment_pos(segments) {
        segments[pos] = new_segment;
    } else {
        let insert_pos = find_exif_segment_pos(segments)
            .map(|p| p + 1)
            .or_else(|| segments.iter().position(|s| s.marker() == APP0).map(|p| p + 1))
            .unwrap_or(0);
        let insert_pos = std::cmp::min(insert_pos, segments.len());
        segments.insert(insert_pos, new_segment);
    }
    Ok(())
}
