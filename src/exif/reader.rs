use anyhow::{Context, Result};
use nom_exif::*;
use std::path::Path;

use super::{
    TAG_ORIENTATION, TAG_XP_COMMENT, TAG_XP_SUBJECT, TAG_XP_TITLE, TagValues, decode_user_comment,
    decode_utf16le,
};
use crate::record::Orientation;

/// Read the tag store of a JPEG file.
///
/// A file without EXIF, or with EXIF the parser rejects, yields empty values; only failing
/// to open the file is an error.
pub fn read_tags(path: &Path) -> Result<TagValues> {
    let mut parser = MediaParser::new();
    let ms = MediaSource::file_path(path).context("Failed to open image file")?;

    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(e) => {
            log::debug!("No EXIF data found in {}: {e}", path.display());
            return Ok(TagValues::default());
        }
    };
    let exif: Exif = iter.into();

    let orientation = exif
        .get(ExifTag::Orientation)
        .or_else(|| exif.get_by_ifd_tag_code(0, TAG_ORIENTATION))
        .and_then(entry_to_u16)
        .and_then(|v| {
            let orientation = Orientation::from_exif_value(v);
            if orientation.is_none() {
                log::debug!("Ignoring unsupported EXIF orientation {v}");
            }
            orientation
        });

    Ok(TagValues {
        image_description: exif.get(ExifTag::ImageDescription).and_then(entry_to_string),
        xp_title: exif.get_by_ifd_tag_code(0, TAG_XP_TITLE).and_then(xp_to_string),
        user_comment: exif.get(ExifTag::UserComment).and_then(user_comment_to_string),
        xp_comment: exif.get_by_ifd_tag_code(0, TAG_XP_COMMENT).and_then(xp_to_string),
        xp_subject: exif.get_by_ifd_tag_code(0, TAG_XP_SUBJECT).and_then(xp_to_string),
        orientation,
    })
}

/// Text up to its NUL padding; whitespace is part of the value.
fn non_empty(s: String) -> Option<String> {
    let s = s.trim_end_matches('\0');
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// Convert an EntryValue to an Option<String>.
fn entry_to_string(val: &EntryValue) -> Option<String> {
    match val {
        EntryValue::Text(s) => non_empty(s.clone()),
        EntryValue::U8Array(b) | EntryValue::Undefined(b) => {
            non_empty(String::from_utf8_lossy(b).into_owned())
        }
        other => non_empty(other.to_string().trim_matches('"').to_string()),
    }
}

/// XP* tags are BYTE arrays of UTF-16LE text.
fn xp_to_string(val: &EntryValue) -> Option<String> {
    match val {
        EntryValue::U8Array(b) | EntryValue::Undefined(b) => non_empty(decode_utf16le(b)),
        other => entry_to_string(other),
    }
}

fn user_comment_to_string(val: &EntryValue) -> Option<String> {
    match val {
        EntryValue::U8Array(b) | EntryValue::Undefined(b) => non_empty(decode_user_comment(b)),
        EntryValue::Text(s) if has_character_code(s.as_bytes()) => {
            non_empty(decode_user_comment(s.as_bytes()))
        }
        other => entry_to_string(other),
    }
}

/// Some parsers hand UserComment back as text with its 8-byte header still attached.
fn has_character_code(bytes: &[u8]) -> bool {
    [&b"ASCII\0\0\0"[..], b"UNICODE\0", b"JIS\0\0\0\0\0", &[0u8; 8]]
        .iter()
        .any(|code| bytes.starts_with(code))
}

fn entry_to_u16(val: &EntryValue) -> Option<u16> {
    match val {
        EntryValue::U16(v) => Some(*v),
        EntryValue::U8(v) => Some(u16::from(*v)),
        EntryValue::U32(v) => u16::try_from(*v).ok(),
        _ => None,
    }
}
