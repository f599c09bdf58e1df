//! Song document handed to plugins.
//!
//! The song model itself belongs to the song-model library; the devkit only
//! needs an opaque, self-describing document it can decode from the wire,
//! pass to plugin code and encode again. A `Song` is a MessagePack map at
//! its root. An empty byte string decodes to an empty song.

use rmpv::Value;

use crate::error::{DevkitError, Result};

/// A song document as seen by plugins.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    root: Vec<(Value, Value)>,
}

impl Song {
    /// Create an empty song.
    pub fn new() -> Self {
        Self { root: Vec::new() }
    }

    /// Decode a song from its serialized form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }

        let mut cursor = bytes;
        let value = rmpv::decode::read_value(&mut cursor)
            .map_err(|e| DevkitError::Codec(format!("Malformed song: {}", e)))?;
        if !cursor.is_empty() {
            return Err(DevkitError::Codec(format!(
                "Malformed song: {} trailing bytes",
                cursor.len()
            )));
        }

        match value {
            Value::Map(root) => Ok(Self { root }),
            other => Err(DevkitError::Codec(format!(
                "Malformed song: expected a map at the root, got {}",
                value_kind(&other)
            ))),
        }
    }

    /// Encode the song into its serialized form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        // Cloning the root keeps `Song` free of a borrowed-map encoder.
        rmpv::encode::write_value(&mut buf, &Value::Map(self.root.clone()))
            .map_err(|e| DevkitError::Codec(format!("Failed to encode song: {}", e)))?;
        Ok(buf)
    }

    /// Look up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Insert or replace a top-level field.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.root.iter_mut().find(|(k, _)| k.as_str() == Some(key)) {
            Some((_, slot)) => *slot = value,
            None => self.root.push((Value::from(key), value)),
        }
    }

    /// Remove a top-level field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.root.iter().position(|(k, _)| k.as_str() == Some(key))?;
        Some(self.root.remove(idx).1)
    }

    /// Top-level field names in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root.iter().filter_map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl Default for Song {
    fn default() -> Self {
        Self::new()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(_, _) => "ext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bytes_decode_to_empty_song() {
        let song = Song::from_bytes(&[]).unwrap();
        assert!(song.is_empty());
    }

    #[test]
    fn test_empty_song_encodes_to_non_empty_bytes() {
        let bytes = Song::new().to_bytes().unwrap();
        assert_eq!(bytes, vec![0x80]);
    }

    #[test]
    fn test_set_get_remove() {
        let mut song = Song::new();
        song.set("bpm", 120);
        song.set("title", "Etude");
        song.set("bpm", 96);

        assert_eq!(song.len(), 2);
        assert_eq!(song.get("bpm").and_then(Value::as_i64), Some(96));
        assert_eq!(song.keys().collect::<Vec<_>>(), vec!["bpm", "title"]);

        let removed = song.remove("title").unwrap();
        assert_eq!(removed.as_str(), Some("Etude"));
        assert!(song.get("title").is_none());
        assert!(song.remove("title").is_none());
    }

    #[test]
    fn test_decode_preserves_fields() {
        let mut song = Song::new();
        song.set("tracks", Value::Array(vec![Value::from("piano")]));
        let decoded = Song::from_bytes(&song.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, song);
    }

    #[test]
    fn test_non_map_root_rejected() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &Value::from(42)).unwrap();
        let err = Song::from_bytes(&buf).unwrap_err();
        assert!(err.to_string().contains("expected a map"));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let err = Song::from_bytes(&[0x80, 0x01]).unwrap_err();
        assert!(matches!(err, DevkitError::Codec(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Song::from_bytes(&[0xc1]).is_err());
    }
}
