//! Media container decoding.
//!
//! Servers answer with a container: top-level attributes plus a list of child
//! items. Three encodings are accepted:
//!
//! - legacy JSON: `{ ..attributes, "_children": [ { "_elementType": .., .. } ] }`
//! - current JSON: `{ "MediaContainer": { ..attributes, "Metadata": [..] } }`
//! - XML: `<MediaContainer ..><Video ../></MediaContainer>`

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use xmltree::{Element, XMLNode};

use crate::media::MediaItem;

/// Child list keys and the element type implied by each.
type ChildLists = &'static [(&'static str, Option<&'static str>)];

const LEGACY_CHILD_LISTS: ChildLists = &[("_children", None)];
const WRAPPED_CHILD_LISTS: ChildLists = &[("Directory", Some("Directory")), ("Metadata", None)];

/// A container body could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(String);

/// Decoded media container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    attributes: BTreeMap<String, String>,
    items: Vec<MediaItem>,
}

impl Container {
    /// Decode JSON, falling back to XML.
    pub fn decode(body: &str) -> Result<Self, DecodeError> {
        Self::from_json(body).or_else(|json_err| {
            Self::from_xml(body).map_err(|xml_err| {
                DecodeError(format!("not JSON ({json_err}) and not XML ({xml_err})"))
            })
        })
    }

    pub fn from_json(body: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(body).map_err(|e| DecodeError(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| DecodeError("container is not a JSON object".to_string()))?;

        let (root, child_lists) = match object.get("MediaContainer").and_then(Value::as_object) {
            Some(inner) => (inner, WRAPPED_CHILD_LISTS),
            None => (object, LEGACY_CHILD_LISTS),
        };

        let attributes = scalar_attributes(root);
        let identifier = attributes.get("identifier").map(String::as_str);

        let mut items = Vec::new();
        for (list_key, element) in child_lists {
            let Some(children) = root.get(*list_key).and_then(Value::as_array) else {
                continue;
            };
            for child in children.iter().filter_map(Value::as_object) {
                let mut child_attributes = scalar_attributes(child);
                if let Some(element) = element {
                    child_attributes
                        .entry("_elementType".to_string())
                        .or_insert_with(|| element.to_string());
                }
                items.push(MediaItem::classify_in(child_attributes, identifier));
            }
        }

        Ok(Self { attributes, items })
    }

    pub fn from_xml(body: &str) -> Result<Self, DecodeError> {
        let root = Element::parse(body.as_bytes()).map_err(|e| DecodeError(e.to_string()))?;

        let attributes: BTreeMap<String, String> = root
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let identifier = attributes.get("identifier").map(String::as_str);

        let items = root
            .children
            .iter()
            .filter_map(|node| match node {
                XMLNode::Element(child) => Some(child),
                _ => None,
            })
            .map(|child| {
                let mut child_attributes: BTreeMap<String, String> = child
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                child_attributes.insert("_elementType".to_string(), child.name.clone());
                MediaItem::classify_in(child_attributes, identifier)
            })
            .collect();

        Ok(Self { attributes, items })
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn into_parts(self) -> (BTreeMap<String, String>, Vec<MediaItem>) {
        (self.attributes, self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `true` if the container was served by the library provider
    pub fn is_library(&self) -> bool {
        self.get("identifier") == Some(crate::media::LIBRARY_IDENTIFIER)
    }
}

/// Keep strings, numbers and booleans; drop nested values.
fn scalar_attributes(object: &Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
                _ => return None,
            };
            Some((key.clone(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaKind, LIBRARY_IDENTIFIER};

    #[test]
    fn test_legacy_json() {
        let body = r#"{
            "_elementType": "MediaContainer",
            "identifier": "com.plexapp.plugins.library",
            "playQueueID": 42,
            "playQueueSelectedItemOffset": 0,
            "_children": [
                {"_elementType": "Video", "type": "episode", "key": "/library/metadata/10", "playQueueItemID": 100,
                 "_children": [{"_elementType": "Media"}]},
                {"_elementType": "Video", "type": "episode", "key": "/library/metadata/11", "playQueueItemID": 101}
            ]
        }"#;

        let container = Container::from_json(body).unwrap();
        assert_eq!(container.get("playQueueID"), Some("42"));
        assert!(container.is_library());
        assert_eq!(container.len(), 2);
        assert_eq!(container.items()[0].play_queue_item_id(), Some(100));
        assert_eq!(container.items()[1].key(), "/library/metadata/11");
        assert!(container.items()[0].markable());
        // Nested children are not flattened into attributes
        assert!(container.items()[0].get("_children").is_none());
    }

    #[test]
    fn test_wrapped_json() {
        let body = r#"{"MediaContainer": {
            "size": 2,
            "playQueueID": "7",
            "allowSync": true,
            "Directory": [{"type": "season", "key": "/library/metadata/5/children", "title": "Season 1"}],
            "Metadata": [{"type": "movie", "key": "/library/metadata/6", "playQueueItemID": 9}]
        }}"#;

        let container = Container::from_json(body).unwrap();
        assert_eq!(container.get("playQueueID"), Some("7"));
        assert_eq!(container.get("allowSync"), Some("1"));
        assert_eq!(container.len(), 2);
        assert!(container.items()[0].is_directory());
        assert_eq!(container.items()[1].kind(), MediaKind::Movie);
        assert!(!container.items()[1].is_directory());
    }

    #[test]
    fn test_xml() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<MediaContainer size="1" identifier="com.plexapp.plugins.library" playQueueID="3">
  <Track type="track" key="/library/metadata/20" title="Song" playQueueItemID="55"/>
</MediaContainer>"#;

        let container = Container::from_xml(body).unwrap();
        assert_eq!(container.get("playQueueID"), Some("3"));
        assert_eq!(container.get("identifier"), Some(LIBRARY_IDENTIFIER));
        assert_eq!(container.items().len(), 1);
        assert_eq!(container.items()[0].get("_elementType"), Some("Track"));
        assert_eq!(container.items()[0].play_queue_item_id(), Some(55));
    }

    #[test]
    fn test_decode_falls_back_to_xml() {
        let container = Container::decode(r#"<MediaContainer size="0"/>"#).unwrap();
        assert!(container.is_empty());
        assert_eq!(container.get("size"), Some("0"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Container::decode("not a container").is_err());
        assert!(Container::decode("[1, 2, 3]").is_err());
    }
}
