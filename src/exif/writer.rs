use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::{Result, bail};
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::{Bytes, ImageEXIF};
use little_exif::endian::Endian;
use little_exif::exif_tag::{ExifTag, ExifTagGroup};
use little_exif::exif_tag_format::ExifTagFormat;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;

use super::tiff::{self, NewEntry, TagData};
use super::{
    TAG_IMAGE_DESCRIPTION, TAG_ORIENTATION, TAG_USER_COMMENT, TAG_XP_COMMENT, TAG_XP_SUBJECT,
    TAG_XP_TITLE, TagValues, encode_user_comment, encode_utf16le,
};

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const EXIF_PREFIX: &[u8] = b"Exif\0\0";

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() expects just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10;

/// Largest TIFF payload of the EXIF APP1 segment (length field, then `Exif\0\0`).
const MAX_TIFF_LEN: usize = u16::MAX as usize - 2 - EXIF_PREFIX.len();

/// Set the present values of `tags` in the EXIF segment of a JPEG.
///
/// Absent values leave their tags alone. A JPEG without EXIF gets a new EXIF segment right
/// after APP0; otherwise the segment is rewritten in place. All other segments and the
/// entropy-coded data are carried over untouched.
///
/// Strategy:
/// 1. Load the existing EXIF with little_exif, set the tags and serialize it again
/// 2. If little_exif can't parse it, edit the raw TIFF structure instead
/// 3. Swap the EXIF segment via img-parts (only the APP1 EXIF segment changes)
pub fn write_tags(bytes: Vec<u8>, tags: &TagValues) -> Result<Vec<u8>> {
    let new_tags = collect_tags(tags);
    if new_tags.is_empty() {
        log::debug!("No EXIF tags to write");
        return Ok(bytes);
    }

    let existing = load_existing_metadata(&bytes);
    let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;

    let orig_exif_pos = find_exif_segment_pos(jpeg.segments());
    let original_exif = jpeg.exif().unwrap_or_default();

    let tiff_data = match existing {
        Some(metadata) => {
            log::debug!("little_exif parsed existing EXIF, using merge strategy");
            serialize_with(metadata, &new_tags)?
        }
        None if original_exif.is_empty() => {
            log::debug!("No EXIF segment, building a new one");
            serialize_with(Metadata::new(), &new_tags)?
        }
        None => {
            log::info!("Using raw TIFF editing to preserve unparseable EXIF");
            let (ifd0, exif_ifd) = collect_entries(tags);
            tiff::set_entries(&original_exif, ifd0, exif_ifd)?
        }
    };
    if tiff_data.len() > MAX_TIFF_LEN {
        bail!(
            "EXIF data of {} bytes does not fit in a JPEG APP1 segment",
            tiff_data.len()
        );
    }

    jpeg.set_exif(Some(Bytes::from(tiff_data)));

    // set_exif() may insert after other APP segments. Put EXIF back where it was, or right
    // after APP0 for a new segment, so it precedes XMP.
    let segments = jpeg.segments_mut();
    if let Some(new_pos) = find_exif_segment_pos(segments) {
        let target_pos = orig_exif_pos
            .or_else(|| segments.iter().position(|s| s.marker() == APP0).map(|p| p + 1))
            .unwrap_or(0);
        if new_pos != target_pos {
            let seg = segments.remove(new_pos);
            let target_pos = std::cmp::min(target_pos, segments.len());
            segments.insert(target_pos, seg);
        }
    }

    Ok(jpeg.encoder().bytes().to_vec())
}

/// Load the EXIF of an in-memory JPEG with little_exif.
///
/// `None` when there is nothing it could parse, including when it panics on odd input.
fn load_existing_metadata(bytes: &Vec<u8>) -> Option<Metadata> {
    match catch_unwind(|| Metadata::new_from_vec(bytes, FileExtension::JPEG)) {
        Ok(Ok(m)) if m.data().is_empty() => {
            log::debug!("little_exif loaded empty metadata");
            None
        }
        Ok(Ok(m)) => {
            log::debug!("little_exif loaded {} existing EXIF tags", m.data().len());
            Some(m)
        }
        Ok(Err(e)) => {
            log::debug!("little_exif could not parse EXIF: {e}");
            None
        }
        Err(_) => {
            log::debug!("little_exif panicked parsing EXIF");
            None
        }
    }
}

/// Set `new_tags` on `metadata` and return the resulting TIFF data.
fn serialize_with(mut metadata: Metadata, new_tags: &[ExifTag]) -> Result<Vec<u8>> {
    let exif_bytes = catch_unwind(AssertUnwindSafe(|| {
        for tag in new_tags {
            metadata.set_tag(tag.clone());
        }
        metadata.as_u8_vec(FileExtension::JPEG)
    }))
    .map_err(|_| anyhow::anyhow!("little_exif panicked serializing EXIF"))?;

    match exif_bytes.get(JPEG_EXIF_OVERHEAD..) {
        Some(tiff_data) if !tiff_data.is_empty() => Ok(tiff_data.to_vec()),
        _ => bail!("little_exif produced no EXIF data"),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Create an XP* tag (UTF-16LE encoded, IFD0 group).
fn make_xp_tag(tag_id: u16, value: &str) -> Option<ExifTag> {
    let tag = ExifTag::from_u16_with_data(
        tag_id,
        &ExifTagFormat::INT8U,
        &encode_utf16le(value),
        &Endian::Little,
        &ExifTagGroup::IFD0,
    );
    if tag.is_err() {
        log::warn!("Could not build EXIF tag {tag_id:#06x}");
    }
    tag.ok()
}

/// The tags to set, as little_exif values.
fn collect_tags(tags: &TagValues) -> Vec<ExifTag> {
    let mut new_tags = Vec::new();

    if let Some(title) = present(&tags.image_description) {
        log::debug!("  ImageDescription: {title}");
        new_tags.push(ExifTag::ImageDescription(title.to_string()));
    }
    if let Some(title) = present(&tags.xp_title) {
        new_tags.extend(make_xp_tag(TAG_XP_TITLE, title));
    }
    if let Some(comment) = present(&tags.user_comment) {
        log::debug!("  UserComment: {comment}");
        new_tags.push(ExifTag::UserComment(encode_user_comment(comment)));
    }
    if let Some(comment) = present(&tags.xp_comment) {
        new_tags.extend(make_xp_tag(TAG_XP_COMMENT, comment));
    }
    if let Some(subject) = present(&tags.xp_subject) {
        log::debug!("  XPSubject: {subject}");
        new_tags.extend(make_xp_tag(TAG_XP_SUBJECT, subject));
    }
    if let Some(orientation) = tags.orientation {
        new_tags.push(ExifTag::Orientation(vec![orientation.exif_value()]));
    }

    new_tags
}

/// The same tags as raw IFD entries, split into IFD0 and Exif IFD.
fn collect_entries(tags: &TagValues) -> (Vec<NewEntry>, Vec<NewEntry>) {
    let mut ifd0 = Vec::new();
    let mut exif_ifd = Vec::new();

    if let Some(title) = present(&tags.image_description) {
        ifd0.push(NewEntry::new(TAG_IMAGE_DESCRIPTION, TagData::Ascii(title.to_string())));
    }
    if let Some(title) = present(&tags.xp_title) {
        ifd0.push(NewEntry::new(TAG_XP_TITLE, TagData::Bytes(encode_utf16le(title))));
    }
    if let Some(comment) = present(&tags.user_comment) {
        exif_ifd.push(NewEntry::new(
            TAG_USER_COMMENT,
            TagData::Undefined(encode_user_comment(comment)),
        ));
    }
    if let Some(comment) = present(&tags.xp_comment) {
        ifd0.push(NewEntry::new(TAG_XP_COMMENT, TagData::Bytes(encode_utf16le(comment))));
    }
    if let Some(subject) = present(&tags.xp_subject) {
        ifd0.push(NewEntry::new(TAG_XP_SUBJECT, TagData::Bytes(encode_utf16le(subject))));
    }
    if let Some(orientation) = tags.orientation {
        ifd0.push(NewEntry::new(TAG_ORIENTATION, TagData::Short(orientation.exif_value())));
    }

    (ifd0, exif_ifd)
}

/// Find the position of the EXIF APP1 segment in a JPEG.
/// EXIF segments have marker 0xE1 (APP1) and contents starting with "Exif\0\0".
fn find_exif_segment_pos(segments: &[JpegSegment]) -> Option<usize> {
    segments
        .iter()
        .position(|s| s.marker() == APP1 && s.contents().starts_with(EXIF_PREFIX))
}
