use std::collections::HashMap;
use std::sync::LazyLock;

pub const NS_X: &str = "adobe:ns:meta/";
pub const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// The application's own namespace: the durable superset of every record field.
pub const NS_APP: &str = "http://ns.eyephoto.app/metadata/1.0/";
pub const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
pub const NS_EXIF: &str = "http://ns.adobe.com/exif/1.0/";
pub const NS_MP: &str = "http://ns.microsoft.com/photo/1.2/";
pub const NS_MPRI: &str = "http://ns.microsoft.com/photo/1.2/t/RegionInfo#";
pub const NS_MPREG: &str = "http://ns.microsoft.com/photo/1.2/t/Region#";

/// Preferred prefixes for the namespaces this crate reads and writes.
pub struct NamespaceRegistry {
    prefixes: HashMap<&'static str, &'static str>,
}

impl NamespaceRegistry {
    fn standard() -> Self {
        let prefixes = HashMap::from([
            (NS_X, "x"),
            (NS_RDF, "rdf"),
            (NS_XML, "xml"),
            (NS_APP, "eyephoto"),
            (NS_DC, "dc"),
            (NS_EXIF, "exif"),
            (NS_MP, "MP"),
            (NS_MPRI, "MPRI"),
            (NS_MPREG, "MPReg"),
            ("http://ns.adobe.com/xap/1.0/", "xmp"),
            ("http://ns.adobe.com/photoshop/1.0/", "photoshop"),
            ("http://ns.adobe.com/tiff/1.0/", "tiff"),
        ]);
        Self { prefixes }
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&'static str> {
        self.prefixes.get(uri).copied()
    }

    pub fn is_prefix_taken(&self, prefix: &str) -> bool {
        self.prefixes.values().any(|p| *p == prefix)
    }
}

static REGISTRY: LazyLock<NamespaceRegistry> = LazyLock::new(NamespaceRegistry::standard);

/// The process-wide registry, built on first use.
pub fn registry() -> &'static NamespaceRegistry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_namespaces_have_prefixes() {
        assert_eq!(registry().prefix_for(NS_APP), Some("eyephoto"));
        assert_eq!(registry().prefix_for(NS_MPREG), Some("MPReg"));
        assert_eq!(registry().prefix_for("http://example.com/ns/"), None);
    }

    #[test]
    fn registry_is_shared_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| registry() as *const NamespaceRegistry as usize))
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }
}
