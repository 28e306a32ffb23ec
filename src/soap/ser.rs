use quick_xml::events::{BytesStart, Event};
use quick_xml::se::to_writer as quick_xml_to_writer;
use quick_xml::{Reader, SeError, Writer};
use serde::Serialize;

/// Serializes a value to a compact XML string and declares `namespaces` on
/// its root element.
///
/// Text is written exactly as given and empty elements stay empty-element
/// tags.
pub fn to_string<T>(value: &T, namespaces: &[(&str, &str)]) -> Result<String, SeError>
where
    T: Serialize,
{
    let mut xml_buf = String::new();
    quick_xml_to_writer(&mut xml_buf, value)?;

    let mut reader = Reader::from_str(&xml_buf);
    reader.config_mut().trim_text(false);

    let mut output_buf = Vec::with_capacity(xml_buf.len());
    let mut writer = Writer::new(&mut output_buf);

    let mut is_root = true;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let start = declare_namespaces(namespaces, e.into_owned(), &mut is_root);
                writer.write_event(Event::Start(start))?;
            }
            Ok(Event::Empty(e)) => {
                let start = declare_namespaces(namespaces, e.into_owned(), &mut is_root);
                writer.write_event(Event::Empty(start))?;
            }
            Ok(Event::Eof) => break,
            Ok(event) => writer.write_event(event)?,
            Err(e) => return Err(SeError::Custom(e.to_string())),
        }
    }

    String::from_utf8(output_buf).map_err(|e| SeError::Custom(e.to_string()))
}

fn declare_namespaces(
    namespaces: &[(&str, &str)],
    mut start: BytesStart<'static>,
    is_root: &mut bool,
) -> BytesStart<'static> {
    if *is_root {
        for (prefix, uri) in namespaces {
            let attr_name = if prefix.is_empty() {
                "xmlns".into()
            } else {
                format!("xmlns:{prefix}")
            };
            start.push_attribute((attr_name.as_bytes(), uri.as_bytes()));
        }
        *is_root = false;
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(rename = "a:Root")]
    struct Root {
        #[serde(rename = "@Id")]
        id: String,
        #[serde(rename = "a:Empty")]
        empty: Marker,
        #[serde(rename = "a:Text")]
        text: String,
    }

    #[derive(Serialize)]
    struct Marker {
        #[serde(rename = "@Kind")]
        kind: String,
    }

    fn sample(text: &str) -> Root {
        Root {
            id: "r1".into(),
            empty: Marker { kind: "k".into() },
            text: text.into(),
        }
    }

    #[test]
    fn test_root_namespace_injection() {
        let xml = to_string(&sample("a < b"), &[("a", "urn:a")]).unwrap();
        assert!(xml.starts_with(r#"<a:Root Id="r1" xmlns:a="urn:a">"#), "{xml}");
        assert!(xml.contains("<a:Text>a &lt; b</a:Text>"), "{xml}");
        assert_eq!(xml.matches("xmlns:a=").count(), 1);
    }

    #[test]
    fn test_surrounding_whitespace_is_kept() {
        let xml = to_string(&sample(" padded "), &[("a", "urn:a")]).unwrap();
        assert!(xml.contains("<a:Text> padded </a:Text>"), "{xml}");
    }

    #[test]
    fn test_output_reparses() {
        let xml = to_string(&sample("x"), &[("a", "urn:a")]).unwrap();
        assert!(!xml.starts_with("<?xml"));

        let doc = crate::xml::Document::parse(&xml).unwrap();
        let empty = doc.find("urn:a", "Empty").unwrap();
        assert_eq!(doc.attribute(empty, "Kind"), Some("k"));
        assert!(doc.children(empty).is_empty());
    }
}
