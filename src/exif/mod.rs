//! EXIF tag store reading and writing.
//!
//! - [`read_tags`] reads the tags this crate cares about from a JPEG file
//! - [`write_tags`] sets them in an in-memory JPEG, changing only the EXIF APP1 segment
//!
//! Title is mirrored into ImageDescription and XPTitle, the comment into UserComment and
//! XPComment, and the subject into XPSubject. The XP* tags hold UTF-16LE text.

mod reader;
mod tiff;
mod writer;

pub use reader::read_tags;
pub use writer::write_tags;

use crate::record::{MetadataRecord, Orientation};

// IFD0
pub(crate) const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
pub(crate) const TAG_ORIENTATION: u16 = 0x0112;
pub(crate) const TAG_XP_TITLE: u16 = 0x9C9B;
pub(crate) const TAG_XP_COMMENT: u16 = 0x9C9C;
pub(crate) const TAG_XP_SUBJECT: u16 = 0x9C9F;
// Exif IFD
pub(crate) const TAG_USER_COMMENT: u16 = 0x9286;

/// Character code header of an ASCII UserComment.
const USER_COMMENT_ASCII: &[u8; 8] = b"ASCII\0\0\0";
const USER_COMMENT_UNICODE: &[u8; 8] = b"UNICODE\0";

/// Tag store values, one slot per tag.
///
/// Slots stay separate so the caller decides precedence between mirrored tags; the
/// resolved views are [`title`](Self::title), [`comment`](Self::comment) and
/// [`subject`](Self::subject).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagValues {
    pub image_description: Option<String>,
    pub xp_title: Option<String>,
    pub user_comment: Option<String>,
    pub xp_comment: Option<String>,
    pub xp_subject: Option<String>,
    pub orientation: Option<Orientation>,
}

impl TagValues {
    /// The tag set a record writes: text fields go to both of their tags.
    pub fn from_record(record: &MetadataRecord) -> Self {
        Self {
            image_description: record.title.clone(),
            xp_title: record.title.clone(),
            user_comment: record.comment.clone(),
            xp_comment: record.comment.clone(),
            xp_subject: record.subject.clone(),
            orientation: record.orientation,
        }
    }

    pub fn title(&self) -> Option<&str> {
        non_empty(&self.image_description)
    }

    /// A non-empty XPComment wins over UserComment.
    pub fn comment(&self) -> Option<&str> {
        non_empty(&self.xp_comment).or_else(|| non_empty(&self.user_comment))
    }

    pub fn subject(&self) -> Option<&str> {
        non_empty(&self.xp_subject)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A blank tag (empty or only padding) does not count as a value.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Encode a string as UTF-16LE bytes with a NUL terminator (XP* tags).
fn encode_utf16le(s: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

/// Decode UTF-16LE bytes up to the first NUL.
fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

fn encode_user_comment(s: &str) -> Vec<u8> {
    let mut data = USER_COMMENT_ASCII.to_vec();
    data.extend_from_slice(s.as_bytes());
    data
}

/// Strip the 8-byte character code header and trailing NULs. Text after an `ASCII` or
/// undefined header is read as UTF-8, which is what most writers put there in practice.
fn decode_user_comment(bytes: &[u8]) -> String {
    let (header, body) = if bytes.len() >= 8 {
        bytes.split_at(8)
    } else {
        (&[][..], bytes)
    };
    let text = if header == USER_COMMENT_UNICODE {
        decode_utf16le(body)
    } else {
        String::from_utf8_lossy(body).into_owned()
    };
    text.trim_end_matches('\0').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_round_trip_stops_at_nul() {
        let bytes = encode_utf16le("Œil gauche");
        assert_eq!(&bytes[bytes.len() - 2..], [0, 0]);
        assert_eq!(decode_utf16le(&bytes), "Œil gauche");

        let mut padded = bytes.clone();
        padded.extend_from_slice(&[b'x', 0]);
        assert_eq!(decode_utf16le(&padded), "Œil gauche");
    }

    #[test]
    fn user_comment_headers() {
        assert_eq!(decode_user_comment(&encode_user_comment("dilated")), "dilated");
        assert_eq!(decode_user_comment(b"\0\0\0\0\0\0\0\0plain\0\0"), "plain");
        assert_eq!(decode_user_comment(&encode_user_comment(" padded \n")), " padded \n");

        let mut unicode = USER_COMMENT_UNICODE.to_vec();
        unicode.extend_from_slice(&encode_utf16le("wide"));
        assert_eq!(decode_user_comment(&unicode), "wide");
    }

    #[test]
    fn xp_comment_wins_over_user_comment() {
        let tags = TagValues {
            user_comment: Some("user".into()),
            xp_comment: Some("xp".into()),
            ..Default::default()
        };
        assert_eq!(tags.comment(), Some("xp"));

        let tags = TagValues {
            xp_comment: Some(" spaced ".into()),
            ..Default::default()
        };
        assert_eq!(tags.comment(), Some(" spaced "));

        let tags = TagValues {
            user_comment: Some("user".into()),
            xp_comment: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(tags.comment(), Some("user"));
    }

    #[test]
    fn from_record_mirrors_text_fields() {
        let record = MetadataRecord {
            title: Some("t".into()),
            comment: Some("c".into()),
            person: Some("ignored".into()),
            ..Default::default()
        };
        let tags = TagValues::from_record(&record);
        assert_eq!(tags.image_description.as_deref(), Some("t"));
        assert_eq!(tags.xp_title.as_deref(), Some("t"));
        assert_eq!(tags.user_comment.as_deref(), Some("c"));
        assert_eq!(tags.xp_comment.as_deref(), Some("c"));
        assert_eq!(tags.xp_subject, None);
        assert_eq!(tags.orientation, None);
    }
}
