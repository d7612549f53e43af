use std::collections::BTreeMap;

use super::document::{XmpDocument, XmpValue};
use super::namespaces::registry;

const PACKET_BEGIN: &str = "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n";
const PACKET_END: &str = "<?xpacket end=\"w\"?>";

/// Serialize a document as a complete XMP packet with a single `rdf:Description`.
pub fn serialize(doc: &XmpDocument) -> String {
    let mut prefixes = Prefixes::new(doc);

    // Body first, so only namespaces that are actually used get declared.
    let mut body = String::new();
    for (name, value) in doc.properties() {
        let tag = format!("{}:{}", prefixes.prefix_for(&name.ns), name.name);
        write_element(&mut body, &mut prefixes, &tag, value, 2);
    }

    let mut xmp = String::new();
    xmp.push_str(PACKET_BEGIN);
    xmp.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    xmp.push_str("<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
    xmp.push_str("<rdf:Description rdf:about=\"\"");
    for (uri, prefix) in &prefixes.assigned {
        xmp.push_str(&format!("\n  xmlns:{prefix}=\"{}\"", xml_escape(uri)));
    }
    if body.is_empty() {
        xmp.push_str("/>\n");
    } else {
        xmp.push_str(">\n");
        xmp.push_str(&body);
        xmp.push_str("</rdf:Description>\n");
    }
    xmp.push_str("</rdf:RDF>\n");
    xmp.push_str("</x:xmpmeta>\n");
    xmp.push_str(PACKET_END);
    xmp
}

fn write_element(
    out: &mut String,
    prefixes: &mut Prefixes,
    tag: &str,
    value: &XmpValue,
    depth: usize,
) {
    let pad = " ".repeat(depth);
    match value {
        XmpValue::Text(text) => {
            out.push_str(&format!("{pad}<{tag}>{}</{tag}>\n", xml_escape(text)));
        }
        XmpValue::LangText { lang, text } => {
            out.push_str(&format!(
                "{pad}<{tag} xml:lang=\"{}\">{}</{tag}>\n",
                xml_escape(lang),
                xml_escape(text)
            ));
        }
        XmpValue::Array(kind, items) => {
            let container = format!("rdf:{}", kind.element_name());
            if items.is_empty() {
                out.push_str(&format!("{pad}<{tag}><{container}/></{tag}>\n"));
                return;
            }
            out.push_str(&format!("{pad}<{tag}>\n{pad} <{container}>\n"));
            for item in items {
                write_element(out, prefixes, "rdf:li", item, depth + 2);
            }
            out.push_str(&format!("{pad} </{container}>\n{pad}</{tag}>\n"));
        }
        XmpValue::Struct(fields) => {
            if fields.is_empty() {
                out.push_str(&format!("{pad}<{tag} rdf:parseType=\"Resource\"/>\n"));
                return;
            }
            out.push_str(&format!("{pad}<{tag} rdf:parseType=\"Resource\">\n"));
            for (name, field) in fields {
                let field_tag = format!("{}:{}", prefixes.prefix_for(&name.ns), name.name);
                write_element(out, prefixes, &field_tag, field, depth + 1);
            }
            out.push_str(&format!("{pad}</{tag}>\n"));
        }
    }
}

/// Prefix assignment for one serialization.
///
/// Registered namespaces use their registered prefix; others keep the prefix they were
/// parsed with when it is free, or get a generated `nsN`.
struct Prefixes<'a> {
    declared: &'a BTreeMap<String, String>,
    assigned: BTreeMap<String, String>,
}

impl<'a> Prefixes<'a> {
    fn new(doc: &'a XmpDocument) -> Self {
        Self {
            declared: &doc.declared_prefixes,
            assigned: BTreeMap::new(),
        }
    }

    fn prefix_for(&mut self, uri: &str) -> String {
        if let Some(prefix) = self.assigned.get(uri) {
            return prefix.clone();
        }

        let prefix = registry()
            .prefix_for(uri)
            .map(str::to_string)
            .or_else(|| {
                self.declared
                    .get(uri)
                    .filter(|p| self.is_free(p) && !registry().is_prefix_taken(p))
                    .cloned()
            })
            .unwrap_or_else(|| {
                (1..)
                    .map(|n| format!("ns{n}"))
                    .find(|p| self.is_free(p))
                    .unwrap_or_default()
            });

        self.assigned.insert(uri.to_string(), prefix.clone());
        prefix
    }

    fn is_free(&self, prefix: &str) -> bool {
        !matches!(prefix, "x" | "rdf" | "xml") && !self.assigned.values().any(|p| p == prefix)
    }
}

/// Escape special XML characters.
///
/// Characters XML 1.0 cannot carry at all (C0 controls other than tab, newline and carriage
/// return, U+FFFE, U+FFFF) are dropped; one of them would make the whole packet unreadable.
/// A carriage return is written as a character reference so parsers do not fold it into `\n`.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\r' => out.push_str("&#13;"),
            '\t' | '\n' => out.push(c),
            c if is_xml_char(c) => out.push(c),
            c => log::debug!("Dropping U+{:04X}, not allowed in XML", c as u32),
        }
    }
    out
}

fn is_xml_char(c: char) -> bool {
    !(c < '\u{20}' || c == '\u{FFFE}' || c == '\u{FFFF}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmp::document::ArrayKind;
    use crate::xmp::namespaces::{NS_APP, NS_DC};
    use crate::xmp::parse;

    #[test]
    fn empty_document_is_a_valid_packet() {
        let text = serialize(&XmpDocument::new());
        assert!(text.starts_with("<?xpacket begin="));
        assert!(text.ends_with(PACKET_END));
        assert!(text.contains("<rdf:Description rdf:about=\"\"/>"));
        assert!(parse(&text).is_empty());
    }

    #[test]
    fn declares_only_used_namespaces() {
        let mut doc = XmpDocument::new();
        doc.set_text(NS_APP, "xCenter", Some("0.5"));
        let text = serialize(&doc);
        assert!(text.contains("xmlns:eyephoto=\"http://ns.eyephoto.app/metadata/1.0/\""));
        assert!(!text.contains("xmlns:dc="));
        assert!(text.contains("<eyephoto:xCenter>0.5</eyephoto:xCenter>"));
    }

    #[test]
    fn escapes_text() {
        let mut doc = XmpDocument::new();
        doc.set_text(NS_APP, "comment", Some("a < b & \"c\""));
        let text = serialize(&doc);
        assert!(text.contains("a &lt; b &amp; &quot;c&quot;"));
        assert_eq!(parse(&text).text(NS_APP, "comment"), Some("a < b & \"c\""));
    }

    #[test]
    fn characters_xml_cannot_carry_are_dropped() {
        let mut doc = XmpDocument::new();
        doc.set_text(NS_APP, "description", Some("bell\u{7}\u{1b}[0m\u{FFFF}"));
        doc.set_text(NS_APP, "xCenter", Some("0.5"));

        let reparsed = parse(&serialize(&doc));
        assert_eq!(reparsed.text(NS_APP, "description"), Some("bell[0m"));
        assert_eq!(reparsed.text(NS_APP, "xCenter"), Some("0.5"));
    }

    #[test]
    fn line_breaks_and_tabs_survive() {
        let mut doc = XmpDocument::new();
        doc.set_text(NS_APP, "comment", Some("a\r\nb\rc\td\n"));
        let text = serialize(&doc);
        assert!(text.contains("a&#13;\nb&#13;c\td\n</"));
        assert_eq!(parse(&text).text(NS_APP, "comment"), Some("a\r\nb\rc\td\n"));
    }

    #[test]
    fn language_qualifier_is_written_back() {
        let mut doc = XmpDocument::new();
        doc.set(
            NS_DC,
            "rights",
            XmpValue::Array(
                ArrayKind::Alt,
                vec![
                    XmpValue::LangText {
                        lang: "x-default".into(),
                        text: "Clinic".into(),
                    },
                    XmpValue::LangText {
                        lang: "de-DE".into(),
                        text: "Klinik".into(),
                    },
                ],
            ),
        );
        let text = serialize(&doc);
        assert!(text.contains("<rdf:li xml:lang=\"de-DE\">Klinik</rdf:li>"));
        assert_eq!(parse(&text).properties, doc.properties);
    }

    #[test]
    fn nested_values_survive_a_round_trip() {
        let mut doc = XmpDocument::new();
        doc.set_first_item(NS_DC, "title", ArrayKind::Seq, "Right eye");
        doc.set(
            "http://example.com/other/",
            "region",
            XmpValue::Array(
                ArrayKind::Bag,
                vec![XmpValue::Struct(vec![(
                    crate::xmp::QName::new("http://example.com/other/", "label"),
                    XmpValue::text("pupil"),
                )])],
            ),
        );

        let reparsed = parse(&serialize(&doc));
        assert_eq!(reparsed.properties, doc.properties);
    }

    #[test]
    fn unknown_namespace_keeps_parsed_prefix_or_gets_generated_one() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<rdf:Description rdf:about="" xmlns:foo="http://example.com/foo/" xmlns:dc2="http://example.com/dc2/" foo:a="1" dc2:b="2"/>
</rdf:RDF></x:xmpmeta>"#;
        let text = serialize(&parse(packet));
        assert!(text.contains("xmlns:foo=\"http://example.com/foo/\""));
        assert!(text.contains("<foo:a>1</foo:a>"));
        assert!(text.contains("<dc2:b>2</dc2:b>"));

        let mut doc = XmpDocument::new();
        doc.set_text("http://example.com/anon/", "c", Some("3"));
        assert!(serialize(&doc).contains("<ns1:c>3</ns1:c>"));
    }

    #[test]
    fn parsed_prefix_clashing_with_registry_is_replaced() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<rdf:Description rdf:about="" xmlns:dc="http://example.com/not-dublin-core/" dc:a="1"/>
</rdf:RDF></x:xmpmeta>"#;
        let text = serialize(&parse(packet));
        assert!(text.contains("xmlns:ns1=\"http://example.com/not-dublin-core/\""));
        assert_eq!(
            parse(&text).text("http://example.com/not-dublin-core/", "a"),
            Some("1")
        );
    }
}
