//! Raw TIFF structure surgery.
//!
//! The tag store is edited by appending rebuilt IFDs to the TIFF data and repointing the
//! header (and the Exif IFD pointer) at them. Everything the old IFDs referenced stays where
//! it was, so offsets held by entries we don't understand (maker notes, thumbnails, GPS)
//! remain valid.
//!
//! When nothing else points at or past the first of the IFDs being rebuilt, the data from
//! there on belongs to those IFDs alone. It is cut off before appending, with any values
//! still needed copied along, so repeated edits don't grow the data.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use anyhow::{Context, Result, bail};

pub const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
const TAG_GPS_IFD_POINTER: u16 = 0x8825;
const TAG_INTEROP_IFD_POINTER: u16 = 0xA005;
const TAG_STRIP_OFFSETS: u16 = 0x0111;
const TAG_TILE_OFFSETS: u16 = 0x0144;
const TAG_SUB_IFDS: u16 = 0x014A;
const TAG_THUMBNAIL_OFFSET: u16 = 0x0201;
const TAG_THUMBNAIL_LENGTH: u16 = 0x0202;
const TAG_MAKER_NOTE: u16 = 0x927C;

/// Tags whose value is the offset of another IFD.
const IFD_POINTER_TAGS: [u16; 3] = [
    TAG_EXIF_IFD_POINTER,
    TAG_GPS_IFD_POINTER,
    TAG_INTEROP_IFD_POINTER,
];

/// Tags holding offsets to data of unknown extent.
const DATA_OFFSET_TAGS: [u16; 3] = [TAG_STRIP_OFFSETS, TAG_TILE_OFFSETS, TAG_SUB_IFDS];

/// Upper bound on linked IFDs followed when looking for references.
const MAX_LINKED_IFDS: usize = 16;

const FORMAT_BYTE: u16 = 1;
const FORMAT_ASCII: u16 = 2;
const FORMAT_SHORT: u16 = 3;
const FORMAT_LONG: u16 = 4;
const FORMAT_UNDEFINED: u16 = 7;

const ENTRY_LEN: usize = 12;
const HEADER_LEN: usize = 8;

/// Size in bytes of one component of a TIFF field type.
fn format_size(format: u16) -> Option<usize> {
    match format {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 | 13 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Byte range of an entry's out-of-line value, `None` when the value sits in the entry.
fn value_range(raw: &[u8; ENTRY_LEN], order: ByteOrder) -> Result<Option<Range<usize>>> {
    let format = order.read_u16(raw, 2)?;
    let count = order.read_u32(raw, 4)? as usize;
    let size = format_size(format).with_context(|| format!("Unknown TIFF field type {format}"))?;
    let len = size.checked_mul(count).context("TIFF value too large")?;
    if len <= 4 {
        return Ok(None);
    }
    let offset = order.read_u32(raw, 8)? as usize;
    Ok(Some(offset..offset.saturating_add(len)))
}

/// Header, IFD0 offset 8, zero entries, no next IFD.
const EMPTY_TIFF: [u8; 14] = [
    b'I', b'I', 42, 0, 8, 0, 0, 0, // header
    0, 0, // entry count
    0, 0, 0, 0, // next IFD
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn from_header(data: &[u8]) -> Result<Self> {
        let order = match data.get(0..2) {
            Some(b"II") => Self::Little,
            Some(b"MM") => Self::Big,
            _ => bail!("Invalid TIFF byte order"),
        };
        if order.read_u16(data, 2)? != 42 {
            bail!("Invalid TIFF magic number");
        }
        Ok(order)
    }

    pub fn read_u16(self, data: &[u8], offset: usize) -> Result<u16> {
        let bytes: [u8; 2] = data
            .get(offset..offset + 2)
            .and_then(|b| b.try_into().ok())
            .with_context(|| format!("TIFF read of 2 bytes at {offset} out of bounds"))?;
        Ok(match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn read_u32(self, data: &[u8], offset: usize) -> Result<u32> {
        let bytes: [u8; 4] = data
            .get(offset..offset + 4)
            .and_then(|b| b.try_into().ok())
            .with_context(|| format!("TIFF read of 4 bytes at {offset} out of bounds"))?;
        Ok(match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        })
    }

    fn encode_u16(self, val: u16) -> [u8; 2] {
        match self {
            Self::Little => val.to_le_bytes(),
            Self::Big => val.to_be_bytes(),
        }
    }

    fn encode_u32(self, val: u32) -> [u8; 4] {
        match self {
            Self::Little => val.to_le_bytes(),
            Self::Big => val.to_be_bytes(),
        }
    }
}

/// A typed value for a new IFD entry.
#[derive(Debug, Clone, PartialEq)]
pub enum TagData {
    /// NUL-terminated text.
    Ascii(String),
    /// Raw BYTE array (XP* tags carry UTF-16LE here).
    Bytes(Vec<u8>),
    Undefined(Vec<u8>),
    Short(u16),
    Long(u32),
}

impl TagData {
    fn format(&self) -> u16 {
        match self {
            Self::Ascii(_) => FORMAT_ASCII,
            Self::Bytes(_) => FORMAT_BYTE,
            Self::Undefined(_) => FORMAT_UNDEFINED,
            Self::Short(_) => FORMAT_SHORT,
            Self::Long(_) => FORMAT_LONG,
        }
    }

    /// Component count and value bytes in the file's byte order.
    fn encode(&self, order: ByteOrder) -> (u32, Vec<u8>) {
        match self {
            Self::Ascii(s) => {
                let mut data = s.as_bytes().to_vec();
                data.push(0);
                (data.len() as u32, data)
            }
            Self::Bytes(b) | Self::Undefined(b) => (b.len() as u32, b.clone()),
            Self::Short(v) => (1, order.encode_u16(*v).to_vec()),
            Self::Long(v) => (1, order.encode_u32(*v).to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub tag: u16,
    pub data: TagData,
}

impl NewEntry {
    pub fn new(tag: u16, data: TagData) -> Self {
        Self { tag, data }
    }
}

enum Slot {
    /// An entry copied verbatim; any offset it holds still points into the old data.
    Kept([u8; ENTRY_LEN]),
    /// A kept entry whose value is copied out of data that is about to be cut off.
    Moved {
        format: u16,
        count: u32,
        value: Vec<u8>,
    },
    New(TagData),
}

struct Ifd {
    entries: BTreeMap<u16, Slot>,
    next: u32,
}

impl Ifd {
    fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            next: 0,
        }
    }

    fn read(data: &[u8], order: ByteOrder, offset: usize) -> Result<Self> {
        let count = order.read_u16(data, offset)? as usize;
        let start = offset + 2;
        let end = start + count * ENTRY_LEN;
        if end + 4 > data.len() {
            bail!("IFD at {offset} with {count} entries extends beyond TIFF data");
        }

        let mut entries = BTreeMap::new();
        for i in 0..count {
            let pos = start + i * ENTRY_LEN;
            let mut raw = [0u8; ENTRY_LEN];
            raw.copy_from_slice(&data[pos..pos + ENTRY_LEN]);
            entries.insert(order.read_u16(data, pos)?, Slot::Kept(raw));
        }

        Ok(Self {
            entries,
            next: order.read_u32(data, end)?,
        })
    }

    fn kept_u32(&self, tag: u16, order: ByteOrder) -> Option<u32> {
        match self.entries.get(&tag)? {
            Slot::Kept(raw) => order.read_u32(raw, 8).ok(),
            Slot::New(TagData::Long(v)) => Some(*v),
            Slot::New(_) | Slot::Moved { .. } => None,
        }
    }

    fn set(&mut self, entry: NewEntry) {
        self.entries.insert(entry.tag, Slot::New(entry.data));
    }

    /// Check the kept entries against a cut at `tail`, collecting the IFDs they link to.
    ///
    /// With `movable`, out-of-line values past the cut are allowed; `take_values` copies them.
    fn check_refs(
        &self,
        data: &[u8],
        order: ByteOrder,
        tail: usize,
        movable: bool,
        linked: &mut Vec<u32>,
    ) -> Result<()> {
        for (&tag, slot) in &self.entries {
            let Slot::Kept(raw) = slot else { continue };
            if DATA_OFFSET_TAGS.contains(&tag) {
                bail!("tag {tag:#06x} points at data of unknown size");
            }
            if let Some(range) = value_range(raw, order)? {
                if range.end > data.len() {
                    bail!("value of tag {tag:#06x} is out of bounds");
                }
                if range.end > tail && (!movable || tag == TAG_MAKER_NOTE) {
                    bail!("value of tag {tag:#06x} lies past offset {tail}");
                }
            }
            if IFD_POINTER_TAGS.contains(&tag) {
                linked.push(order.read_u32(raw, 8)?);
            }
            if tag == TAG_THUMBNAIL_OFFSET {
                let start = order.read_u32(raw, 8)? as usize;
                let len = self.kept_u32(TAG_THUMBNAIL_LENGTH, order).unwrap_or(0) as usize;
                if start.saturating_add(len) > tail {
                    bail!("thumbnail lies past offset {tail}");
                }
            }
        }
        linked.push(self.next);
        Ok(())
    }

    /// Copy out-of-line values reaching past `end` into the entries themselves.
    fn take_values(&mut self, data: &[u8], order: ByteOrder, end: usize) -> Result<()> {
        for slot in self.entries.values_mut() {
            let Slot::Kept(raw) = slot else { continue };
            let raw = *raw;
            let Some(range) = value_range(&raw, order)? else { continue };
            if range.end <= end {
                continue;
            }
            let value = data
                .get(range.clone())
                .with_context(|| format!("TIFF value at {range:?} out of bounds"))?
                .to_vec();
            *slot = Slot::Moved {
                format: order.read_u16(&raw, 2)?,
                count: order.read_u32(&raw, 4)?,
                value,
            };
        }
        Ok(())
    }

    /// Append this IFD (entries sorted by tag, then out-of-line values) and return its offset.
    fn append(&self, out: &mut Vec<u8>, order: ByteOrder) -> Result<u32> {
        if out.len() % 2 == 1 {
            out.push(0);
        }
        let start = out.len();
        let count = u16::try_from(self.entries.len()).context("Too many IFD entries")?;

        let mut table = TableWriter {
            order,
            table: Vec::with_capacity(2 + self.entries.len() * ENTRY_LEN + 4),
            blobs: Vec::new(),
            data_start: start + 2 + self.entries.len() * ENTRY_LEN + 4,
        };

        table.table.extend_from_slice(&order.encode_u16(count));
        for (&tag, slot) in &self.entries {
            match slot {
                Slot::Kept(raw) => table.table.extend_from_slice(raw),
                Slot::Moved {
                    format,
                    count,
                    value,
                } => table.entry(tag, *format, *count, value.clone())?,
                Slot::New(data) => {
                    let (components, value) = data.encode(order);
                    table.entry(tag, data.format(), components, value)?;
                }
            }
        }
        table.table.extend_from_slice(&order.encode_u32(self.next));

        out.extend_from_slice(&table.table);
        out.extend_from_slice(&table.blobs);
        u32::try_from(start).context("TIFF data too large")
    }
}

/// An IFD table being written, with the out-of-line values that follow it.
struct TableWriter {
    order: ByteOrder,
    table: Vec<u8>,
    blobs: Vec<u8>,
    data_start: usize,
}

impl TableWriter {
    fn entry(&mut self, tag: u16, format: u16, count: u32, mut value: Vec<u8>) -> Result<()> {
        let order = self.order;
        self.table.extend_from_slice(&order.encode_u16(tag));
        self.table.extend_from_slice(&order.encode_u16(format));
        self.table.extend_from_slice(&order.encode_u32(count));
        if value.len() <= 4 {
            value.resize(4, 0);
            self.table.extend_from_slice(&value);
        } else {
            let offset =
                u32::try_from(self.data_start + self.blobs.len()).context("TIFF data too large")?;
            self.table.extend_from_slice(&order.encode_u32(offset));
            self.blobs.extend_from_slice(&value);
            if self.blobs.len() % 2 == 1 {
                self.blobs.push(0);
            }
        }
        Ok(())
    }
}

/// Whether the data from `tail` on can be dropped once `rebuilt` are written anew.
fn check_cut(data: &[u8], order: ByteOrder, tail: usize, rebuilt: &[&Ifd]) -> Result<()> {
    if tail < HEADER_LEN {
        bail!("IFD overlaps the TIFF header");
    }

    let mut pending = Vec::new();
    for ifd in rebuilt {
        ifd.check_refs(data, order, tail, true, &mut pending)?;
    }

    let mut seen = BTreeSet::new();
    while let Some(offset) = pending.pop() {
        if offset == 0 || !seen.insert(offset) {
            continue;
        }
        if seen.len() > MAX_LINKED_IFDS {
            bail!("too many linked IFDs");
        }
        let offset = offset as usize;
        let count = order.read_u16(data, offset)? as usize;
        if offset + 2 + count * ENTRY_LEN + 4 > tail {
            bail!("IFD at {offset} lies past offset {tail}");
        }
        let ifd = Ifd::read(data, order, offset)?;
        ifd.check_refs(data, order, tail, false, &mut pending)?;
    }
    Ok(())
}

/// Return new TIFF data with `ifd0` entries set in IFD0 and `exif` entries set in the Exif
/// IFD. Same-tag entries are replaced. Empty `original` data starts a new TIFF structure.
pub fn set_entries(original: &[u8], ifd0: Vec<NewEntry>, exif: Vec<NewEntry>) -> Result<Vec<u8>> {
    if ifd0.is_empty() && exif.is_empty() {
        return Ok(original.to_vec());
    }

    let original = if original.is_empty() {
        &EMPTY_TIFF[..]
    } else {
        original
    };
    let order = ByteOrder::from_header(original)?;
    let ifd0_offset = order.read_u32(original, 4)? as usize;
    let mut root = Ifd::read(original, order, ifd0_offset).context("Failed to read IFD0")?;
    let mut tail = ifd0_offset;

    let mut exif_ifd = None;
    if !exif.is_empty() {
        let mut ifd = match root.kept_u32(TAG_EXIF_IFD_POINTER, order) {
            Some(offset) => {
                tail = tail.min(offset as usize);
                Ifd::read(original, order, offset as usize).context("Failed to read Exif IFD")?
            }
            None => {
                log::debug!("No Exif IFD present, creating one");
                Ifd::empty()
            }
        };
        for entry in exif {
            ifd.set(entry);
        }
        // Placeholder until the new Exif IFD has an offset.
        root.set(NewEntry::new(TAG_EXIF_IFD_POINTER, TagData::Long(0)));
        exif_ifd = Some(ifd);
    }
    for entry in ifd0 {
        root.set(entry);
    }

    let cut = {
        let rebuilt: Vec<&Ifd> = std::iter::once(&root).chain(exif_ifd.as_ref()).collect();
        check_cut(original, order, tail, &rebuilt)
    };
    let mut result = match cut {
        Ok(()) => {
            root.take_values(original, order, tail)?;
            if let Some(ifd) = exif_ifd.as_mut() {
                ifd.take_values(original, order, tail)?;
            }
            original[..tail].to_vec()
        }
        Err(e) => {
            log::debug!("Keeping previous IFDs in place: {e}");
            original.to_vec()
        }
    };

    if let Some(ifd) = exif_ifd {
        let offset = ifd.append(&mut result, order)?;
        root.set(NewEntry::new(TAG_EXIF_IFD_POINTER, TagData::Long(offset)));
    }
    let root_offset = root.append(&mut result, order)?;
    result[4..8].copy_from_slice(&order.encode_u32(root_offset));

    Ok(result)
}

/// Locate the raw value bytes of `tag` in IFD0 (or, when `in_exif_ifd`, the Exif IFD).
#[cfg(test)]
pub fn find_value(tiff: &[u8], tag: u16, in_exif_ifd: bool) -> Option<(u16, Vec<u8>)> {
    let order = ByteOrder::from_header(tiff).ok()?;
    let root = Ifd::read(tiff, order, order.read_u32(tiff, 4).ok()? as usize).ok()?;
    let ifd = if in_exif_ifd {
        let offset = root.kept_u32(TAG_EXIF_IFD_POINTER, order)?;
        Ifd::read(tiff, order, offset as usize).ok()?
    } else {
        root
    };
    let Slot::Kept(raw) = ifd.entries.get(&tag)? else {
        return None;
    };
    let format = order.read_u16(raw, 2).ok()?;
    let len = order.read_u32(raw, 4).ok()? as usize * format_size(format)?;
    let value = match value_range(raw, order).ok()? {
        Some(range) => tiff.get(range)?.to_vec(),
        None => raw[8..8 + len].to_vec(),
    };
    Some((format, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags_in(tiff: &[u8], in_exif_ifd: bool) -> Vec<u16> {
        let order = ByteOrder::from_header(tiff).unwrap();
        let root = Ifd::read(tiff, order, order.read_u32(tiff, 4).unwrap() as usize).unwrap();
        let ifd = if in_exif_ifd {
            let offset = root.kept_u32(TAG_EXIF_IFD_POINTER, order).unwrap();
            Ifd::read(tiff, order, offset as usize).unwrap()
        } else {
            root
        };
        ifd.entries.keys().copied().collect()
    }

    #[test]
    fn builds_from_nothing() {
        let tiff = set_entries(
            &[],
            vec![NewEntry::new(0x010E, TagData::Ascii("Left eye".into()))],
            vec![NewEntry::new(0x9286, TagData::Undefined(b"ASCII\0\0\0hi".to_vec()))],
        )
        .unwrap();

        assert_eq!(&tiff[0..4], b"II*\0");
        assert_eq!(tags_in(&tiff, false), [0x010E, TAG_EXIF_IFD_POINTER]);
        assert_eq!(tags_in(&tiff, true), [0x9286]);
        assert_eq!(
            find_value(&tiff, 0x010E, false),
            Some((FORMAT_ASCII, b"Left eye\0".to_vec()))
        );
        assert_eq!(
            find_value(&tiff, 0x9286, true),
            Some((FORMAT_UNDEFINED, b"ASCII\0\0\0hi".to_vec()))
        );
    }

    #[test]
    fn replaces_same_tag_and_keeps_others() {
        let first = set_entries(
            &[],
            vec![
                NewEntry::new(0x010E, TagData::Ascii("old title".into())),
                NewEntry::new(0x0112, TagData::Short(1)),
            ],
            vec![],
        )
        .unwrap();
        let second = set_entries(
            &first,
            vec![NewEntry::new(0x010E, TagData::Ascii("new".into()))],
            vec![],
        )
        .unwrap();

        assert_eq!(tags_in(&second, false), [0x010E, 0x0112]);
        assert_eq!(
            find_value(&second, 0x010E, false),
            Some((FORMAT_ASCII, b"new\0".to_vec()))
        );
        assert_eq!(
            find_value(&second, 0x0112, false),
            Some((FORMAT_SHORT, vec![1, 0]))
        );
    }

    #[test]
    fn big_endian_values_are_encoded_in_file_order() {
        let mut big = EMPTY_TIFF;
        big[0..4].copy_from_slice(b"MM\0*");
        big[4..8].copy_from_slice(&8u32.to_be_bytes());

        let tiff = set_entries(&big, vec![NewEntry::new(0x0112, TagData::Short(6))], vec![])
            .unwrap();
        assert_eq!(&tiff[0..2], b"MM");
        assert_eq!(
            find_value(&tiff, 0x0112, false),
            Some((FORMAT_SHORT, vec![0, 6]))
        );
    }

    #[test]
    fn reuses_existing_exif_ifd() {
        let first = set_entries(
            &[],
            vec![],
            vec![NewEntry::new(0x9003, TagData::Ascii("2021:03:14 15:09:26".into()))],
        )
        .unwrap();
        let second = set_entries(
            &first,
            vec![],
            vec![NewEntry::new(0x9286, TagData::Undefined(b"ASCII\0\0\0x".to_vec()))],
        )
        .unwrap();
        assert_eq!(tags_in(&second, true), [0x9003, 0x9286]);
        assert_eq!(
            find_value(&second, 0x9003, true),
            Some((FORMAT_ASCII, b"2021:03:14 15:09:26\0".to_vec()))
        );
    }

    /// IFD0 at 8 linking to an IFD1 at 26 whose text value sits at 44.
    fn tiff_with_ifd1() -> Vec<u8> {
        let mut tiff = b"II*\0\x08\0\0\0".to_vec();
        tiff.extend_from_slice(&[1, 0, 0x12, 0x01, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0, 26, 0, 0, 0]);
        tiff.extend_from_slice(&[1, 0, 0x0E, 0x01, 2, 0, 6, 0, 0, 0, 44, 0, 0, 0, 0, 0, 0, 0]);
        tiff.extend_from_slice(b"thumb\0");
        tiff
    }

    #[test]
    fn identical_edits_keep_the_same_bytes() {
        let ifd0 = || {
            vec![
                NewEntry::new(0x010E, TagData::Ascii("Right eye".into())),
                NewEntry::new(0x9C9F, TagData::Bytes(b"J\0a\0n\0e\0\0\0".to_vec())),
                NewEntry::new(0x0112, TagData::Short(6)),
            ]
        };
        let exif = || vec![NewEntry::new(0x9286, TagData::Undefined(b"ASCII\0\0\0dilated".to_vec()))];

        let first = set_entries(&[], ifd0(), exif()).unwrap();
        let mut tiff = first.clone();
        for _ in 0..1000 {
            tiff = set_entries(&tiff, ifd0(), exif()).unwrap();
        }
        assert_eq!(tiff, first);
    }

    #[test]
    fn alternating_edits_stay_bounded_and_keep_other_values() {
        let subject = b"J\0a\0n\0e\0\0\0".to_vec();
        let mut tiff = set_entries(
            &[],
            vec![NewEntry::new(0x9C9F, TagData::Bytes(subject.clone()))],
            vec![],
        )
        .unwrap();

        let mut sizes = Vec::new();
        for i in 0..200 {
            let title = if i % 2 == 0 { "Left eye" } else { "Right eye" };
            let ifd0 = vec![NewEntry::new(0x010E, TagData::Ascii(title.into()))];
            tiff = set_entries(&tiff, ifd0, vec![]).unwrap();
            let exif = vec![NewEntry::new(0x9286, TagData::Undefined(b"ASCII\0\0\0dilated".to_vec()))];
            tiff = set_entries(&tiff, vec![], exif).unwrap();
            sizes.push(tiff.len());
        }

        assert!(sizes.iter().all(|&len| len == sizes[0]), "sizes: {sizes:?}");
        assert_eq!(find_value(&tiff, 0x9C9F, false), Some((FORMAT_BYTE, subject)));
        assert_eq!(
            find_value(&tiff, 0x010E, false),
            Some((FORMAT_ASCII, b"Right eye\0".to_vec()))
        );
        assert_eq!(
            find_value(&tiff, 0x9286, true),
            Some((FORMAT_UNDEFINED, b"ASCII\0\0\0dilated".to_vec()))
        );
    }

    #[test]
    fn data_linked_from_ifd0_is_never_cut() {
        let original = tiff_with_ifd1();
        let title = || vec![NewEntry::new(0x010E, TagData::Ascii("Left eye".into()))];

        let first = set_entries(&original, title(), vec![]).unwrap();
        assert!(first.starts_with(&original));
        let order = ByteOrder::Little;
        let root = Ifd::read(&first, order, order.read_u32(&first, 4).unwrap() as usize).unwrap();
        assert_eq!(root.next, 26);

        let mut tiff = first.clone();
        for _ in 0..100 {
            tiff = set_entries(&tiff, title(), vec![]).unwrap();
        }
        assert_eq!(tiff.len(), first.len());
        assert_eq!(tiff[..original.len()], original[..]);
        assert_eq!(
            find_value(&tiff, 0x010E, false),
            Some((FORMAT_ASCII, b"Left eye\0".to_vec()))
        );
        assert_eq!(find_value(&tiff, 0x0112, false), Some((FORMAT_SHORT, vec![1, 0])));
    }

    #[test]
    fn maker_note_past_the_cut_keeps_old_ifds() {
        let first = set_entries(
            &[],
            vec![],
            vec![NewEntry::new(TAG_MAKER_NOTE, TagData::Undefined(vec![7; 32]))],
        )
        .unwrap();
        let second = set_entries(
            &first,
            vec![],
            vec![NewEntry::new(0x9286, TagData::Undefined(b"ASCII\0\0\0x".to_vec()))],
        )
        .unwrap();
        assert!(second.len() > first.len());
        assert_eq!(second[HEADER_LEN..first.len()], first[HEADER_LEN..]);
        assert_eq!(
            find_value(&second, TAG_MAKER_NOTE, true),
            Some((FORMAT_UNDEFINED, vec![7; 32]))
        );
    }

    #[test]
    fn nothing_to_write_is_identity() {
        let data = b"not even tiff".to_vec();
        assert_eq!(set_entries(&data, vec![], vec![]).unwrap(), data);
    }

    #[test]
    fn corrupt_header_is_an_error() {
        let entry = || vec![NewEntry::new(0x0112, TagData::Short(1))];
        assert!(set_entries(b"XX*\0\x08\0\0\0", entry(), vec![]).is_err());
        assert!(set_entries(b"II*\0\xff\0\0\0", entry(), vec![]).is_err());
    }
}
