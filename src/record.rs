//! The in-memory metadata record and its text encodings.
//!
//! Every field is optional. Both metadata stores hold values as text, so each field type
//! implements [`TextValue`]; [`encode`] and [`decode`] wrap that with the absence rules:
//! absent encodes to no value, and no value or an empty string decodes to absent.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Which eye the photo shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "UPPERCASE")]
pub enum RightLeft {
    Right,
    Left,
}

/// Overlay color as 32-bit ARGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayColor(pub u32);

impl OverlayColor {
    pub fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self(u32::from_be_bytes([a, r, g, b]))
    }
}

/// Display rotation of the image, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    #[serde(rename = "0")]
    Normal,
    #[serde(rename = "90")]
    Rotate90,
    #[serde(rename = "180")]
    Rotate180,
    #[serde(rename = "270")]
    Rotate270,
}

impl Orientation {
    pub fn degrees(self) -> u16 {
        match self {
            Self::Normal => 0,
            Self::Rotate90 => 90,
            Self::Rotate180 => 180,
            Self::Rotate270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Self::Normal),
            90 => Some(Self::Rotate90),
            180 => Some(Self::Rotate180),
            270 => Some(Self::Rotate270),
            _ => None,
        }
    }

    /// The EXIF `Orientation` tag value for this rotation.
    pub fn exif_value(self) -> u16 {
        match self {
            Self::Normal => 1,
            Self::Rotate90 => 6,
            Self::Rotate180 => 3,
            Self::Rotate270 => 8,
        }
    }

    /// Mirrored EXIF orientations (2, 4, 5, 7) have no rotation equivalent and map to `None`.
    pub fn from_exif_value(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Normal),
            6 => Some(Self::Rotate90),
            3 => Some(Self::Rotate180),
            8 => Some(Self::Rotate270),
            _ => None,
        }
    }
}

/// A UTC point in time at millisecond resolution, the resolution the stores keep.
///
/// Finer precision is truncated on construction, so a value always survives a write and
/// read back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "DateTime<Utc>", into = "DateTime<Utc>")]
pub struct MillisDate(DateTime<Utc>);

impl MillisDate {
    pub fn new(date: DateTime<Utc>) -> Self {
        Self(date.trunc_subsecs(3))
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }

    pub fn millis(self) -> i64 {
        self.0.timestamp_millis()
    }

    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for MillisDate {
    fn from(date: DateTime<Utc>) -> Self {
        Self::new(date)
    }
}

impl From<MillisDate> for DateTime<Utc> {
    fn from(date: MillisDate) -> Self {
        date.0
    }
}

impl std::fmt::Display for MillisDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }
}

/// Capability flags stored alongside the overlay position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFlags(u32);

impl MetadataFlags {
    /// The overlay position was placed by the capture flow.
    pub const OVERLAY_SET_BY_CAPTURE: Self = Self(1);
    /// The overlay center was determined automatically rather than by the user.
    pub const OVERLAY_POSITION_AUTOMATIC: Self = Self(1 << 1);
    /// The overlay size was determined automatically rather than by the user.
    pub const OVERLAY_SIZE_AUTOMATIC: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for MetadataFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Metadata attached to one eye photo.
///
/// This is the value callers hand to the write coordinator and get back from reads. It is
/// the reconciled view over the EXIF and XMP stores; see [`crate::reconciler`] for how each
/// field is sourced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetadataRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_center: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_center: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_scale_factor: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organize_date: Option<MillisDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_left: Option<RightLeft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_color: Option<OverlayColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(skip_serializing_if = "MetadataFlags::is_empty")]
    pub flags: MetadataFlags,
}

impl MetadataRecord {
    pub fn has_overlay_position(&self) -> bool {
        self.x_center.is_some() && self.y_center.is_some() && self.overlay_scale_factor.is_some()
    }

    pub fn has_brightness_contrast(&self) -> bool {
        self.brightness.is_some() && self.contrast.is_some()
    }

    /// Overwrite every field that is present in `patch`; absent fields keep their value.
    pub fn update_from(&mut self, patch: MetadataRecord) {
        fn take<T>(target: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *target = value;
            }
        }

        take(&mut self.title, patch.title);
        take(&mut self.description, patch.description);
        take(&mut self.subject, patch.subject);
        take(&mut self.comment, patch.comment);
        take(&mut self.person, patch.person);
        take(&mut self.x_center, patch.x_center);
        take(&mut self.y_center, patch.y_center);
        take(&mut self.overlay_scale_factor, patch.overlay_scale_factor);
        take(&mut self.organize_date, patch.organize_date);
        take(&mut self.right_left, patch.right_left);
        take(&mut self.brightness, patch.brightness);
        take(&mut self.contrast, patch.contrast);
        take(&mut self.overlay_color, patch.overlay_color);
        take(&mut self.orientation, patch.orientation);
        self.flags.insert(patch.flags);
    }
}

/// A field type with a text form in the metadata stores.
pub trait TextValue: Sized {
    /// Text that stores write to mean "absent" for this type, besides an empty value.
    const ABSENT_TEXT: Option<&'static str> = None;

    /// Whether surrounding whitespace is insignificant in the text form.
    const TRIMMED: bool = true;

    /// `None` when the value has no valid text form and must be stored as absent.
    fn to_text(&self) -> Option<String>;

    /// `None` when the text is not a valid encoding.
    fn from_text(text: &str) -> Option<Self>;
}

/// Encode an optional field. Absent stays absent.
pub fn encode<T: TextValue>(value: Option<&T>) -> Option<String> {
    value.and_then(TextValue::to_text)
}

/// Decode an optional field. A malformed value is logged and treated as absent, without
/// affecting any other field.
pub fn decode<T: TextValue>(field: &str, text: Option<&str>) -> Option<T> {
    let text = text?;
    let text = if T::TRIMMED { text.trim() } else { text };
    if text.is_empty() || T::ABSENT_TEXT == Some(text) {
        return None;
    }
    let value = T::from_text(text);
    if value.is_none() {
        log::warn!("Ignoring malformed value for {field}: {text:?}");
    }
    value
}

impl TextValue for String {
    const TRIMMED: bool = false;

    fn to_text(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.clone())
    }

    fn from_text(text: &str) -> Option<Self> {
        (!text.is_empty()).then(|| text.to_string())
    }
}

impl TextValue for f32 {
    fn to_text(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn from_text(text: &str) -> Option<Self> {
        text.parse().ok()
    }
}

/// Milliseconds since the epoch. `0` is reserved for "absent", so the epoch itself is not
/// representable and encodes as absent.
impl TextValue for MillisDate {
    const ABSENT_TEXT: Option<&'static str> = Some("0");

    fn to_text(&self) -> Option<String> {
        let millis = self.millis();
        (millis != 0).then(|| millis.to_string())
    }

    fn from_text(text: &str) -> Option<Self> {
        Self::from_millis(text.parse().ok()?)
    }
}

impl TextValue for RightLeft {
    fn to_text(&self) -> Option<String> {
        Some(
            match self {
                Self::Right => "RIGHT",
                Self::Left => "LEFT",
            }
            .to_string(),
        )
    }

    fn from_text(text: &str) -> Option<Self> {
        if text.eq_ignore_ascii_case("right") {
            Some(Self::Right)
        } else if text.eq_ignore_ascii_case("left") {
            Some(Self::Left)
        } else {
            None
        }
    }
}

/// Written as `#AARRGGBB`; plain decimal integers (signed or unsigned) are accepted on read.
impl TextValue for OverlayColor {
    fn to_text(&self) -> Option<String> {
        Some(format!("#{:08X}", self.0))
    }

    fn from_text(text: &str) -> Option<Self> {
        if let Some(hex) = text.strip_prefix('#') {
            return match hex.len() {
                8 => u32::from_str_radix(hex, 16).ok().map(Self),
                6 => u32::from_str_radix(hex, 16).ok().map(|rgb| Self(0xFF00_0000 | rgb)),
                _ => None,
            };
        }
        text.parse::<u32>()
            .ok()
            .or_else(|| text.parse::<i32>().ok().map(|v| v as u32))
            .map(Self)
    }
}

impl TextValue for Orientation {
    fn to_text(&self) -> Option<String> {
        Some(self.degrees().to_string())
    }

    fn from_text(text: &str) -> Option<Self> {
        text.parse().ok().and_then(Self::from_degrees)
    }
}

impl TextValue for MetadataFlags {
    const ABSENT_TEXT: Option<&'static str> = Some("0");

    fn to_text(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.0.to_string())
    }

    fn from_text(text: &str) -> Option<Self> {
        text.parse().ok().map(Self)
    }
}
