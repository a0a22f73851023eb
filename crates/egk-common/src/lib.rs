//! EGK Common - Shared data structures and utilities for eGK container processing
//!
//! The patient (EF.PD) and insurance (EF.VD) containers of a German health
//! insurance card hold gzip-compressed XML. This crate recovers the text from
//! the raw container bytes and scrapes field values out of it.

mod container;
pub mod fields;

pub use container::{decode_text, inflate, locate_gzip, recover, ContainerError, GZIP_PREFIX};
pub use fields::{CardField, FieldSource, UnknownField};

/// Tag scraper for eGK container XML
///
/// Searches for the first `<tag>` ... `</tag>` span in the text and returns its
/// trimmed inner text. This is not an XML parser: there is no entity decoding,
/// no namespace handling and no nesting awareness. A tag with attributes does
/// not match.
///
/// # Arguments
/// * `text` - The decompressed container text
/// * `tag` - The literal element name, including any namespace prefix
///
/// # Returns
/// * `Some(&str)` - The trimmed inner text (possibly empty)
/// * `None` - If the opening or closing tag is missing
pub fn find_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    if tag.is_empty() {
        return None;
    }

    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = text.find(&open)? + open.len();
    let end = start + text[start..].find(&close)?;

    Some(text[start..end].trim())
}

/// Resolve a scoped tag path such as `Kostentraeger/Name`
///
/// Each segment narrows the search to the inner text of the previous match.
/// Every segment is tried with each prefix in order (e.g. `""`, `"vsd:"`);
/// the first prefix that matches wins for that segment.
pub fn find_path<'a>(text: &'a str, path: &str, prefixes: &[&str]) -> Option<&'a str> {
    const NO_PREFIX: &[&str] = &[""];
    let prefixes = if prefixes.is_empty() { NO_PREFIX } else { prefixes };

    let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
    segments.peek()?;

    segments.try_fold(text, |scope, segment| {
        prefixes
            .iter()
            .find_map(|prefix| find_tag(scope, &format!("{}{}", prefix, segment)))
    })
}

/// Name of the outermost element, skipping the XML declaration and comments
pub fn root_element(text: &str) -> Option<&str> {
    let mut rest = text;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];
        if rest.starts_with('?') || rest.starts_with('!') {
            continue;
        }
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..end];
        return if name.is_empty() { None } else { Some(name) };
    }
}

/// Check whether the container text ends with the closing tag of its root
///
/// Some early cards store the patient container without the final `>` of
/// the root closing tag, or without the closing tag at all. Extraction still
/// works on such text; this only reports the condition.
pub fn is_complete(text: &str) -> bool {
    match root_element(text) {
        Some(root) => text.trim_end().ends_with(&format!("</{}>", root)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_tag_simple() {
        let text = "<Vorname>Anna</Vorname><Nachname>Muster</Nachname>";
        assert_eq!(find_tag(text, "Vorname"), Some("Anna"));
        assert_eq!(find_tag(text, "Nachname"), Some("Muster"));
    }

    #[test]
    fn test_find_tag_not_found() {
        let text = "<Vorname>Anna</Vorname>";
        assert_eq!(find_tag(text, "Geburtsdatum"), None);
        assert_eq!(find_tag(text, ""), None);
    }

    #[test]
    fn test_find_tag_trims_and_keeps_first() {
        let text = "<Ort>\n  Berlin  </Ort><Ort>Hamburg</Ort>";
        assert_eq!(find_tag(text, "Ort"), Some("Berlin"));
    }

    #[test]
    fn test_find_tag_no_entity_decoding() {
        let text = "<Name>M&amp;M Kasse</Name>";
        assert_eq!(find_tag(text, "Name"), Some("M&amp;M Kasse"));
    }

    #[test]
    fn test_find_tag_missing_close() {
        let text = "<Vorname>Anna</Vorname><Nachname>Muster";
        assert_eq!(find_tag(text, "Vorname"), Some("Anna"));
        assert_eq!(find_tag(text, "Nachname"), None);
    }

    #[test]
    fn test_find_path_scoped() {
        let text = "<Versicherter><Person><Name>Muster</Name></Person></Versicherter>\
                    <Kostentraeger><Name>AOK</Name>\
                    <AbrechnenderKostentraeger><Name>BKK</Name></AbrechnenderKostentraeger>\
                    </Kostentraeger>";
        assert_eq!(find_path(text, "Kostentraeger/Name", &[]), Some("AOK"));
        assert_eq!(
            find_path(text, "AbrechnenderKostentraeger/Name", &[]),
            Some("BKK")
        );
        assert_eq!(find_path(text, "Name", &[]), Some("Muster"));
        assert_eq!(find_path(text, "Missing/Name", &[]), None);
        assert_eq!(find_path(text, "", &[]), None);
    }

    #[test]
    fn test_find_path_prefixes() {
        let text = "<vsd:Person><vsd:Vorname>Anna</vsd:Vorname></vsd:Person>";
        assert_eq!(find_path(text, "Person/Vorname", &["", "vsd:"]), Some("Anna"));
        assert_eq!(find_path(text, "Person/Vorname", &[""]), None);
    }

    #[test]
    fn test_root_element_and_completeness() {
        let full = "<?xml version=\"1.0\" encoding=\"ISO-8859-15\"?>\
                    <UC_PersoenlicheVersichertendatenXML CDM_VERSION=\"5.2.0\">\
                    <Vorname>Anna</Vorname></UC_PersoenlicheVersichertendatenXML>";
        assert_eq!(root_element(full), Some("UC_PersoenlicheVersichertendatenXML"));
        assert!(is_complete(full));

        let cut = &full[..full.len() - 1];
        assert!(!is_complete(cut));
        assert_eq!(find_tag(cut, "Vorname"), Some("Anna"));

        assert!(!is_complete("no markup here"));
    }
}
