//! Embedded document parsing for encoded-data fields

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Owned XML element tree
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: Option<String>,
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let attributes: serde_json::Map<String, serde_json::Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::json!({
            "name": self.name,
            "attributes": attributes,
            "children": self.children.iter().map(XmlElement::to_json).collect::<Vec<_>>(),
            "text": self.text,
        })
    }
}

/// Parse a JSON document. Only objects and arrays count: a bare scalar such
/// as a named schema reference is not an embedded document.
pub fn parse_json_document(source: &str) -> Option<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(source) {
        Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => Some(value),
        _ => None,
    }
}

/// Parse an XML document into its root element
pub fn parse_xml(source: &str) -> Result<XmlElement, String> {
    if !source.trim_start().starts_with('<') {
        return Err("not an XML document".to_string());
    }

    let mut reader = Reader::from_str(source);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(element_from(&start)?),
            Ok(Event::Empty(start)) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| "unbalanced closing tag".to_string())?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| e.to_string())?;
                append_text(&mut stack, &text)?;
            }
            Ok(Event::CData(data)) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                append_text(&mut stack, &text)?;
            }
            Ok(Event::Eof) => break,
            // declarations, comments, processing instructions, doctype
            Ok(_) => {}
            Err(err) => {
                return Err(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    err
                ))
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
        text: None,
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_some() {
        return Err("multiple root elements".to_string());
    } else {
        *root = Some(element);
    }
    Ok(())
}

fn append_text(stack: &mut [XmlElement], text: &str) -> Result<(), String> {
    match stack.last_mut() {
        Some(current) => {
            current.text.get_or_insert_with(String::new).push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err("text outside of the root element".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_xml_schema() {
        let xml = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<xs:schema attributeFormDefault="unqualified"
           elementFormDefault="qualified"
           targetNamespace="http://example.com/schemas/soccer"
           xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="league">
    <xs:complexType/>
  </xs:element>
</xs:schema>"#;
        let root = parse_xml(xml).unwrap();
        assert_eq!(root.name, "xs:schema");
        assert_eq!(root.attribute("elementFormDefault"), Some("qualified"));
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].attribute("name"), Some("league"));
        assert_eq!(root.children[0].children[0].name, "xs:complexType");
    }

    #[test]
    fn test_parse_xml_text() {
        let root = parse_xml("<root>none</root>").unwrap();
        assert_eq!(root.text.as_deref(), Some("none"));
    }

    #[test]
    fn test_parse_xml_rejects_plain_strings() {
        assert!(parse_xml("league-xml").is_err());
        assert!(parse_xml("<a><b></a>").is_err());
        assert!(parse_xml("<a/><b/>").is_err());
    }

    #[test]
    fn test_json_document_requires_container() {
        assert!(parse_json_document(r#"{"type": "object"}"#).is_some());
        assert!(parse_json_document("[1, 2]").is_some());
        assert!(parse_json_document("123").is_none());
        assert!(parse_json_document("league-json").is_none());
    }
}
