//! Reconcile the two metadata stores of a JPEG into one [`MetadataRecord`] and back.
//!
//! Reading precedence for the five text fields (title, description, subject, comment,
//! person) is EXIF tag, then conventional XMP namespace, then the application namespace.
//! Structural fields (overlay position and scale, organize date, side, brightness,
//! contrast, overlay color, flags) only ever come from the application namespace.
//!
//! Writing is two separate file rewrites: the XMP packet first, then (when the policy
//! allows) the EXIF tags. They are not atomic together. A crash between them leaves the
//! packet new and the tags old, which reads back consistently because the tags still win.

use std::path::Path;

use anyhow::Context;
use img_parts::Bytes;
use img_parts::jpeg::Jpeg;

use crate::config::WritePolicy;
use crate::container::ensure_jpeg;
use crate::coordinator::MetadataBackend;
use crate::error::{MetadataError, Result};
use crate::exif::{self, TagValues};
use crate::record::{MetadataFlags, MetadataRecord, decode, encode};
use crate::rewrite::rewrite_file;
use crate::xmp::{self, CustomItem, StandardItem, XmpDocument, segment};

/// What a write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The policy did not allow writing.
    Skipped,
    /// The file is not a JPEG; it was left alone.
    NotJpeg,
    /// The packet was rewritten, and the tags too when `tags` is set.
    Written { tags: bool },
}

/// The JPEG file stores as a [`MetadataBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegMetadataStore;

impl MetadataBackend for JpegMetadataStore {
    fn read(&self, path: &Path) -> Option<MetadataRecord> {
        read_record(path)
    }

    fn write(
        &self,
        path: &Path,
        record: &MetadataRecord,
        policy: WritePolicy,
    ) -> Result<WriteOutcome> {
        write_record(path, record, policy)
    }
}

/// Read the reconciled record of a file.
///
/// `None` means the file has no metadata stores this crate understands: it is not a JPEG,
/// or it could not be read at all.
pub fn read_record(path: &Path) -> Option<MetadataRecord> {
    if let Err(e) = ensure_jpeg(path) {
        log::debug!("No metadata for {}: {e}", path.display());
        return None;
    }

    let doc = match std::fs::read(path) {
        Ok(bytes) => read_packet(bytes),
        Err(e) => {
            log::warn!("Failed to read {}: {e}", path.display());
            return None;
        }
    };
    let tags = exif::read_tags(path).unwrap_or_else(|e| {
        log::warn!("Ignoring unreadable EXIF in {}: {e:#}", path.display());
        TagValues::default()
    });

    Some(reconcile(&doc, &tags))
}

fn read_packet(bytes: Vec<u8>) -> XmpDocument {
    match Jpeg::from_bytes(Bytes::from(bytes)) {
        Ok(jpeg) => segment::read_packet(&jpeg)
            .map(|packet| xmp::parse(&packet))
            .unwrap_or_default(),
        Err(e) => {
            log::debug!("Failed to parse JPEG segments: {e}");
            XmpDocument::default()
        }
    }
}

/// Merge a parsed packet and tag values into a record.
pub fn reconcile(doc: &XmpDocument, tags: &TagValues) -> MetadataRecord {
    let custom = |item: CustomItem| doc.custom(item);
    let standard = |item: StandardItem| doc.standard_text(item);

    let mut record = MetadataRecord {
        x_center: decode("xCenter", custom(CustomItem::XCenter)),
        y_center: decode("yCenter", custom(CustomItem::YCenter)),
        overlay_scale_factor: decode(
            "overlayScaleFactor",
            custom(CustomItem::OverlayScaleFactor),
        ),
        organize_date: decode("organizeDate", custom(CustomItem::OrganizeDate)),
        right_left: decode("rightLeft", custom(CustomItem::RightLeft)),
        brightness: decode("brightness", custom(CustomItem::Brightness)),
        contrast: decode("contrast", custom(CustomItem::Contrast)),
        overlay_color: decode("overlayColor", custom(CustomItem::OverlayColor)),
        flags: decode::<MetadataFlags>("flags", custom(CustomItem::Flags)).unwrap_or_default(),

        description: decode("dc:description", standard(StandardItem::Description)),
        subject: decode("dc:subject", standard(StandardItem::Subject)),
        title: decode("dc:title", standard(StandardItem::Title)),
        person: decode("PersonDisplayName", doc.person()),
        comment: decode("exif:UserComment", standard(StandardItem::Comment)),
        orientation: None,
    };

    if let Some(title) = tags.title() {
        record.title = Some(title.to_string());
    }
    if let Some(comment) = tags.comment() {
        record.comment = Some(comment.to_string());
    }
    if record.subject.is_none() {
        record.subject = tags.subject().map(str::to_string);
    }
    record.orientation = tags.orientation;

    let fallback = |field: &mut Option<String>, item: CustomItem| {
        if field.is_none() {
            *field = decode(item.name(), custom(item));
        }
    };
    fallback(&mut record.description, CustomItem::Description);
    fallback(&mut record.subject, CustomItem::Subject);
    fallback(&mut record.person, CustomItem::Person);
    fallback(&mut record.title, CustomItem::Title);
    fallback(&mut record.comment, CustomItem::Comment);
    if record.orientation.is_none() {
        record.orientation = decode("orientation", custom(CustomItem::Orientation));
    }

    record
}

/// Write `record` into the file's stores as far as `policy` allows.
pub fn write_record(
    path: &Path,
    record: &MetadataRecord,
    policy: WritePolicy,
) -> Result<WriteOutcome> {
    if !policy.writes_packet() {
        log::debug!("Write policy forbids writing {}", path.display());
        return Ok(WriteOutcome::Skipped);
    }

    match ensure_jpeg(path) {
        Ok(()) => {}
        Err(MetadataError::NotJpeg { detected, .. }) => {
            log::warn!("Not writing metadata to {} ({detected})", path.display());
            return Ok(WriteOutcome::NotJpeg);
        }
        Err(e) => return Err(e),
    }

    let with_tags = policy.writes_tags();
    rewrite_file(path, |bytes| update_packet(bytes, record, with_tags))?;

    if with_tags {
        let tags = TagValues::from_record(record);
        if !tags.is_empty() {
            rewrite_file(path, |bytes| exif::write_tags(bytes, &tags))?;
        }
    }

    log::info!("Metadata written to {}", path.display());
    Ok(WriteOutcome::Written { tags: with_tags })
}

fn update_packet(
    bytes: Vec<u8>,
    record: &MetadataRecord,
    standard: bool,
) -> anyhow::Result<Vec<u8>> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;

    let mut doc = segment::read_packet(&jpeg)
        .map(|packet| xmp::parse(&packet))
        .unwrap_or_default();
    apply_custom(&mut doc, record);
    if standard {
        apply_standard(&mut doc, record);
    }

    segment::write_packet(&mut jpeg, &xmp::serialize(&doc))
        .context("Failed to store XMP packet")?;
    Ok(jpeg.encoder().bytes().to_vec())
}

/// Every application item mirrors the record; absent fields delete their item.
fn apply_custom(doc: &mut XmpDocument, record: &MetadataRecord) {
    let items = [
        (CustomItem::Title, encode(record.title.as_ref())),
        (CustomItem::Description, encode(record.description.as_ref())),
        (CustomItem::Subject, encode(record.subject.as_ref())),
        (CustomItem::Comment, encode(record.comment.as_ref())),
        (CustomItem::Person, encode(record.person.as_ref())),
        (CustomItem::XCenter, encode(record.x_center.as_ref())),
        (CustomItem::YCenter, encode(record.y_center.as_ref())),
        (CustomItem::OverlayScaleFactor, encode(record.overlay_scale_factor.as_ref())),
        (CustomItem::OrganizeDate, encode(record.organize_date.as_ref())),
        (CustomItem::RightLeft, encode(record.right_left.as_ref())),
        (CustomItem::Brightness, encode(record.brightness.as_ref())),
        (CustomItem::Contrast, encode(record.contrast.as_ref())),
        (CustomItem::OverlayColor, encode(record.overlay_color.as_ref())),
        (CustomItem::Orientation, encode(record.orientation.as_ref())),
        (CustomItem::Flags, encode(Some(&record.flags))),
    ];
    for (item, value) in items {
        doc.set_custom(item, value.as_deref());
    }
}

fn apply_standard(doc: &mut XmpDocument, record: &MetadataRecord) {
    let text = |value: &Option<String>| encode(value.as_ref());
    doc.set_standard_text(StandardItem::Title, text(&record.title).as_deref());
    doc.set_standard_text(StandardItem::Description, text(&record.description).as_deref());
    doc.set_standard_text(StandardItem::Subject, text(&record.subject).as_deref());
    doc.set_standard_text(StandardItem::Comment, text(&record.comment).as_deref());
    doc.set_person(text(&record.person).as_deref());
}
