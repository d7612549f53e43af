use roxmltree::Node;

use super::document::{ArrayKind, Fields, QName, XmpDocument, XmpValue};
use super::namespaces::{NS_RDF, NS_XML};

/// Start of the trailer processing instruction that closes an XMP packet.
const XPACKET_END: &str = "<?xpacket end=";

/// Parse an XMP packet.
///
/// Never fails: a missing, truncated, or malformed packet yields an empty document, which
/// reads as "every property absent".
pub fn parse(text: &str) -> XmpDocument {
    let body = trim_packet(text);
    if body.trim().is_empty() {
        return XmpDocument::default();
    }

    match roxmltree::Document::parse(body) {
        Ok(xml) => from_xml(&xml),
        Err(e) => {
            log::debug!("Discarding unparseable XMP packet: {e}");
            XmpDocument::default()
        }
    }
}

/// Drop the BOM, the `<?xpacket end=...?>` trailer, and any padding after it.
fn trim_packet(text: &str) -> &str {
    let text = text
        .trim_start_matches('\u{feff}')
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    match text.rfind(XPACKET_END) {
        Some(pos) => &text[..pos],
        None => text,
    }
}

fn from_xml(xml: &roxmltree::Document) -> XmpDocument {
    let mut doc = XmpDocument::default();

    for node in xml.descendants().filter(Node::is_element) {
        for ns in node.namespaces() {
            if let Some(prefix) = ns.name() {
                doc.declared_prefixes
                    .entry(ns.uri().to_string())
                    .or_insert_with(|| prefix.to_string());
            }
        }
    }

    let descriptions = xml.descendants().filter(|n| {
        is_rdf(n, "Description") && n.parent_element().is_some_and(|p| is_rdf(&p, "RDF"))
    });
    for description in descriptions {
        for (name, value) in struct_fields(description) {
            doc.set(&name.ns, &name.name, value);
        }
    }

    doc
}

fn is_rdf(node: &Node, name: &str) -> bool {
    node.is_element()
        && node.tag_name().namespace() == Some(NS_RDF)
        && node.tag_name().name() == name
}

/// Attributes outside the rdf and xml namespaces are property shorthand.
fn property_attributes(node: Node) -> Fields {
    node.attributes()
        .filter_map(|attr| {
            let ns = attr.namespace()?;
            if ns == NS_RDF || ns == NS_XML {
                return None;
            }
            Some((QName::new(ns, attr.name()), XmpValue::text(attr.value())))
        })
        .collect()
}

/// The fields of a struct-like node: shorthand attributes then child elements.
fn struct_fields(node: Node) -> Fields {
    let mut fields = property_attributes(node);
    for child in node.children().filter(Node::is_element) {
        let Some(ns) = child.tag_name().namespace() else {
            log::debug!("Skipping XMP element without namespace: {}", child.tag_name().name());
            continue;
        };
        fields.push((QName::new(ns, child.tag_name().name()), value_of(child)));
    }
    fields
}

fn value_of(node: Node) -> XmpValue {
    if let Some(resource) = node.attribute((NS_RDF, "resource")) {
        return XmpValue::text(resource);
    }
    if node.attribute((NS_RDF, "parseType")) == Some("Resource") {
        return XmpValue::Struct(struct_fields(node));
    }

    let elements: Vec<Node> = node.children().filter(Node::is_element).collect();
    match elements.as_slice() {
        [] => {
            let fields = property_attributes(node);
            if fields.is_empty() {
                let text = node.text().unwrap_or_default().to_string();
                match node.attribute((NS_XML, "lang")) {
                    Some(lang) => XmpValue::LangText {
                        lang: lang.to_string(),
                        text,
                    },
                    None => XmpValue::Text(text),
                }
            } else {
                XmpValue::Struct(fields)
            }
        }
        [only] if only.tag_name().namespace() == Some(NS_RDF) => {
            if let Some(kind) = ArrayKind::from_element_name(only.tag_name().name()) {
                let items = only
                    .children()
                    .filter(|n| is_rdf(n, "li"))
                    .map(value_of)
                    .collect();
                XmpValue::Array(kind, items)
            } else {
                XmpValue::Struct(struct_fields(*only))
            }
        }
        _ => XmpValue::Struct(struct_fields(node)),
    }
}
