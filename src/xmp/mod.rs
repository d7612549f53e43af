//! XMP packet store.
//!
//! The packet carries the record twice: once in the application's own namespace (every
//! field, the durable superset) and once in conventional namespaces that other photo tools
//! read (`dc:title`, `dc:description`, `dc:subject`, `exif:UserComment`, and the Microsoft
//! Photo region path for the person name).
//!
//! Everything here is pure: [`parse`] and [`serialize`] work on text, and [`segment`]
//! works on an in-memory JPEG.

mod document;
pub mod namespaces;
mod parse;
pub mod segment;
mod serialize;

pub use document::{ArrayKind, QName, XmpDocument, XmpValue};
pub use parse::parse;
pub use serialize::serialize;

use namespaces::{NS_APP, NS_DC, NS_EXIF, NS_MP, NS_MPREG, NS_MPRI};

/// Items in the application namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomItem {
    Title,
    Description,
    Subject,
    Comment,
    Person,
    XCenter,
    YCenter,
    OverlayScaleFactor,
    OrganizeDate,
    RightLeft,
    Brightness,
    Contrast,
    OverlayColor,
    Orientation,
    Flags,
}

impl CustomItem {
    pub fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Subject => "subject",
            Self::Comment => "comment",
            Self::Person => "person",
            Self::XCenter => "xCenter",
            Self::YCenter => "yCenter",
            Self::OverlayScaleFactor => "overlayScaleFactor",
            Self::OrganizeDate => "organizeDate",
            Self::RightLeft => "rightLeft",
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::OverlayColor => "overlayColor",
            Self::Orientation => "orientation",
            Self::Flags => "flags",
        }
    }
}

/// Text items in the conventional namespaces, each stored as a one-element ordered array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardItem {
    Title,
    Description,
    Subject,
    Comment,
}

impl StandardItem {
    fn qname(self) -> (&'static str, &'static str) {
        match self {
            Self::Title => (NS_DC, "title"),
            Self::Description => (NS_DC, "description"),
            Self::Subject => (NS_DC, "subject"),
            Self::Comment => (NS_EXIF, "UserComment"),
        }
    }
}

const REGION_INFO: (&str, &str) = (NS_MP, "RegionInfo");
const REGIONS: (&str, &str) = (NS_MPRI, "Regions");
const PERSON_DISPLAY_NAME: (&str, &str) = (NS_MPREG, "PersonDisplayName");

impl XmpDocument {
    pub fn custom(&self, item: CustomItem) -> Option<&str> {
        self.text(NS_APP, item.name())
    }

    /// Set a custom item; `None` deletes it.
    pub fn set_custom(&mut self, item: CustomItem, value: Option<&str>) {
        self.set_text(NS_APP, item.name(), value);
    }

    /// Element 1 of the item's array. Bags, alternatives and simple values are read too.
    pub fn standard_text(&self, item: StandardItem) -> Option<&str> {
        let (ns, name) = item.qname();
        self.first_item(ns, name)
    }

    /// Create or update element 1 of the item's array; `None` deletes the whole property.
    pub fn set_standard_text(&mut self, item: StandardItem, value: Option<&str>) {
        let (ns, name) = item.qname();
        match value {
            Some(v) => self.set_first_item(ns, name, ArrayKind::Seq, v),
            None => {
                self.remove(ns, name);
            }
        }
    }

    /// `MP:RegionInfo/MPRI:Regions[1]/MPReg:PersonDisplayName`.
    pub fn person(&self) -> Option<&str> {
        self.get(REGION_INFO.0, REGION_INFO.1)?
            .field(REGIONS.0, REGIONS.1)?
            .item(0)?
            .field(PERSON_DISPLAY_NAME.0, PERSON_DISPLAY_NAME.1)?
            .as_text()
            .filter(|s| !s.is_empty())
    }

    /// Set the person name on the first region, creating the region path as needed.
    /// `None` removes the name and leaves the rest of the region in place.
    pub fn set_person(&mut self, name: Option<&str>) {
        match name {
            Some(name) => {
                let info = self
                    .entry(REGION_INFO.0, REGION_INFO.1, || XmpValue::Struct(Vec::new()))
                    .ensure_struct();
                let regions = document::entry(info, REGIONS.0, REGIONS.1, || {
                    XmpValue::Array(ArrayKind::Bag, Vec::new())
                })
                .ensure_array(ArrayKind::Bag);
                if regions.is_empty() {
                    regions.push(XmpValue::Struct(Vec::new()));
                }
                let region = regions[0].ensure_struct();
                *document::entry(region, PERSON_DISPLAY_NAME.0, PERSON_DISPLAY_NAME.1, || {
                    XmpValue::text("")
                }) = XmpValue::text(name);
            }
            None => {
                let info = self
                    .properties
                    .iter_mut()
                    .find(|(q, _)| q.is(REGION_INFO.0, REGION_INFO.1));
                let region = match info {
                    Some((_, XmpValue::Struct(info))) => info
                        .iter_mut()
                        .find(|(q, _)| q.is(REGIONS.0, REGIONS.1))
                        .and_then(|(_, regions)| match regions {
                            XmpValue::Array(_, items) => items.first_mut(),
                            _ => None,
                        }),
                    _ => None,
                };
                if let Some(XmpValue::Struct(fields)) = region {
                    document::remove(fields, PERSON_DISPLAY_NAME.0, PERSON_DISPLAY_NAME.1);
                }
            }
        }
    }
}
