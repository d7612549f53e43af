use std::collections::BTreeMap;

/// A namespace-qualified XMP name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub ns: String,
    pub name: String,
}

impl QName {
    pub fn new(ns: &str, name: &str) -> Self {
        Self {
            ns: ns.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is(&self, ns: &str, name: &str) -> bool {
        self.ns == ns && self.name == name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// Ordered array.
    Seq,
    /// Unordered array.
    Bag,
    /// Alternatives, usually language variants.
    Alt,
}

impl ArrayKind {
    pub fn element_name(self) -> &'static str {
        match self {
            Self::Seq => "Seq",
            Self::Bag => "Bag",
            Self::Alt => "Alt",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        match name {
            "Seq" => Some(Self::Seq),
            "Bag" => Some(Self::Bag),
            "Alt" => Some(Self::Alt),
            _ => None,
        }
    }
}

pub type Fields = Vec<(QName, XmpValue)>;

/// A property value in the XMP data model.
#[derive(Debug, Clone, PartialEq)]
pub enum XmpValue {
    Text(String),
    /// Text with an `xml:lang` qualifier, as found in `rdf:Alt` items.
    LangText { lang: String, text: String },
    Array(ArrayKind, Vec<XmpValue>),
    Struct(Fields),
}

impl XmpValue {
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::LangText { text: s, .. } => Some(s),
            _ => None,
        }
    }

    /// Array element by zero-based index.
    pub fn item(&self, index: usize) -> Option<&XmpValue> {
        match self {
            Self::Array(_, items) => items.get(index),
            _ => None,
        }
    }

    pub fn field(&self, ns: &str, name: &str) -> Option<&XmpValue> {
        match self {
            Self::Struct(fields) => find(fields, ns, name),
            _ => None,
        }
    }

    /// Turn this value into a struct (discarding a non-struct value) and return its fields.
    pub fn ensure_struct(&mut self) -> &mut Fields {
        if !matches!(self, Self::Struct(_)) {
            *self = Self::Struct(Vec::new());
        }
        match self {
            Self::Struct(fields) => fields,
            _ => unreachable!("value was just made a struct"),
        }
    }

    /// Turn this value into an array (discarding a non-array value) and return its items.
    pub fn ensure_array(&mut self, kind: ArrayKind) -> &mut Vec<XmpValue> {
        if !matches!(self, Self::Array(..)) {
            *self = Self::Array(kind, Vec::new());
        }
        match self {
            Self::Array(_, items) => items,
            _ => unreachable!("value was just made an array"),
        }
    }
}

pub(crate) fn find<'a>(fields: &'a Fields, ns: &str, name: &str) -> Option<&'a XmpValue> {
    fields.iter().find(|(q, _)| q.is(ns, name)).map(|(_, v)| v)
}

/// The entry for `ns:name`, inserted from `default` when missing.
pub(crate) fn entry<'a>(
    fields: &'a mut Fields,
    ns: &str,
    name: &str,
    default: impl FnOnce() -> XmpValue,
) -> &'a mut XmpValue {
    let pos = match fields.iter().position(|(q, _)| q.is(ns, name)) {
        Some(pos) => pos,
        None => {
            fields.push((QName::new(ns, name), default()));
            fields.len() - 1
        }
    };
    &mut fields[pos].1
}

pub(crate) fn remove(fields: &mut Fields, ns: &str, name: &str) -> Option<XmpValue> {
    let pos = fields.iter().position(|(q, _)| q.is(ns, name))?;
    Some(fields.remove(pos).1)
}

/// A parsed XMP packet: top-level properties in document order.
///
/// Properties this crate does not know about are kept, so a parse → modify → serialize
/// cycle does not drop other applications' metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmpDocument {
    pub(crate) properties: Fields,
    /// Prefixes declared in the parsed packet, by namespace URI.
    pub(crate) declared_prefixes: BTreeMap<String, String>,
}

impl XmpDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn properties(&self) -> impl Iterator<Item = (&QName, &XmpValue)> {
        self.properties.iter().map(|(q, v)| (q, v))
    }

    pub fn get(&self, ns: &str, name: &str) -> Option<&XmpValue> {
        find(&self.properties, ns, name)
    }

    /// Set a property, replacing an existing value in place.
    pub fn set(&mut self, ns: &str, name: &str, value: XmpValue) {
        *entry(&mut self.properties, ns, name, || XmpValue::Text(String::new())) = value;
    }

    pub fn remove(&mut self, ns: &str, name: &str) -> Option<XmpValue> {
        remove(&mut self.properties, ns, name)
    }

    pub(crate) fn entry(
        &mut self,
        ns: &str,
        name: &str,
        default: impl FnOnce() -> XmpValue,
    ) -> &mut XmpValue {
        entry(&mut self.properties, ns, name, default)
    }

    /// A simple text property. Empty text reads as absent.
    pub fn text(&self, ns: &str, name: &str) -> Option<&str> {
        self.get(ns, name)
            .and_then(XmpValue::as_text)
            .filter(|s| !s.is_empty())
    }

    /// Set or (with `None`) delete a simple text property.
    pub fn set_text(&mut self, ns: &str, name: &str, value: Option<&str>) {
        match value {
            Some(v) => self.set(ns, name, XmpValue::text(v)),
            None => {
                self.remove(ns, name);
            }
        }
    }

    /// First element of an array property; a simple value is read as a one-element array.
    pub fn first_item(&self, ns: &str, name: &str) -> Option<&str> {
        let value = self.get(ns, name)?;
        let first = value.as_text().or_else(|| value.item(0).and_then(XmpValue::as_text));
        first.filter(|s| !s.is_empty())
    }

    /// Create or update element 1 of an array property. Other elements are kept.
    pub fn set_first_item(&mut self, ns: &str, name: &str, kind: ArrayKind, value: &str) {
        let items = self
            .entry(ns, name, || XmpValue::Array(kind, Vec::new()))
            .ensure_array(kind);
        match items.first_mut() {
            Some(XmpValue::LangText { text, .. }) => *text = value.to_string(),
            Some(first) => *first = XmpValue::text(value),
            None => items.push(XmpValue::text(value)),
        }
    }
}
