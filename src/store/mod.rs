//! Evidence persistence collaborator
//!
//! The pipeline only reads evidence: `all()` feeds index builds and
//! `get_embedding` serves lookups by id. Ingestion is owned elsewhere; the
//! in-memory store here is what the CLI and tests load corpora into.

use ahash::AHashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{Result, VerityError};
use crate::types::{EvidenceId, EvidenceItem};

/// Read-only access to embedded evidence
pub trait EvidenceStore: Send + Sync {
    /// Stored embedding for an evidence item, if the item exists and is embedded
    fn get_embedding(&self, id: &EvidenceId) -> Option<Vec<f32>>;

    /// Iterate every stored evidence item
    fn all(&self) -> Box<dyn Iterator<Item = EvidenceItem> + '_>;

    /// Number of stored items
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Evidence held in memory, in insertion order
#[derive(Debug, Default, Clone)]
pub struct InMemoryEvidenceStore {
    items: Vec<EvidenceItem>,
    positions: AHashMap<EvidenceId, usize>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = EvidenceItem>) -> Self {
        let mut store = Self::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    /// Insert an item, replacing any existing item with the same id
    pub fn insert(&mut self, item: EvidenceItem) {
        if let Some(&pos) = self.positions.get(&item.id) {
            self.items[pos] = item;
        } else {
            self.positions.insert(item.id.clone(), self.items.len());
            self.items.push(item);
        }
    }

    pub fn get(&self, id: &EvidenceId) -> Option<&EvidenceItem> {
        self.positions.get(id).map(|&pos| &self.items[pos])
    }

    /// Ids of items that carry no embedding yet
    pub fn unembedded_ids(&self) -> Vec<EvidenceId> {
        self.items
            .iter()
            .filter(|item| !item.is_embedded())
            .map(|item| item.id.clone())
            .collect()
    }

    /// Attach an embedding to an existing item; returns false for unknown ids
    pub fn set_embedding(&mut self, id: &EvidenceId, embedding: Vec<f32>) -> bool {
        match self.positions.get(id) {
            Some(&pos) => {
                self.items[pos].embedding = embedding;
                true
            }
            None => false,
        }
    }

    /// Load a corpus from a JSON-lines file, one `EvidenceItem` per line
    ///
    /// Blank lines are skipped. Later lines win on duplicate ids.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| VerityError::Io {
            source: e,
            context: format!("Failed to open evidence file: {:?}", path),
        })?;

        let mut store = Self::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| VerityError::Io {
                source: e,
                context: format!("Failed to read evidence file: {:?}", path),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let item: EvidenceItem = serde_json::from_str(&line).map_err(|e| VerityError::Json {
                source: e,
                context: format!("Invalid evidence record at {:?}:{}", path, line_no + 1),
            })?;
            store.insert(item);
        }

        tracing::info!("Loaded {} evidence items from {:?}", store.len(), path);
        Ok(store)
    }

    /// Write the corpus back as JSON lines
    pub fn save_jsonl(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path).map_err(|e| VerityError::Io {
            source: e,
            context: format!("Failed to create evidence file: {:?}", path),
        })?;

        for item in &self.items {
            let line = serde_json::to_string(item).map_err(|e| VerityError::Json {
                source: e,
                context: format!("Failed to serialize evidence {}", item.id),
            })?;
            writeln!(file, "{}", line).map_err(|e| VerityError::Io {
                source: e,
                context: format!("Failed to write evidence file: {:?}", path),
            })?;
        }

        Ok(())
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn get_embedding(&self, id: &EvidenceId) -> Option<Vec<f32>> {
        self.get(id)
            .filter(|item| item.is_embedded())
            .map(|item| item.embedding.clone())
    }

    fn all(&self) -> Box<dyn Iterator<Item = EvidenceItem> + '_> {
        Box::new(self.items.iter().cloned())
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(id: &str, text: &str, embedding: Vec<f32>) -> EvidenceItem {
        EvidenceItem::new(id, text, "test", embedding)
    }

    #[test]
    fn test_insert_replaces_duplicate_ids() {
        let mut store = InMemoryEvidenceStore::new();
        store.insert(item("a", "first", vec![1.0]));
        store.insert(item("b", "second", vec![]));
        store.insert(item("a", "replaced", vec![2.0]));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&"a".into()).unwrap().text, "replaced");
        assert_eq!(store.get_embedding(&"a".into()), Some(vec![2.0]));
        assert_eq!(store.get_embedding(&"b".into()), None);
        assert_eq!(store.unembedded_ids(), vec![EvidenceId::from("b")]);
    }

    #[test]
    fn test_all_preserves_insertion_order() {
        let store = InMemoryEvidenceStore::from_items(vec![
            item("z", "last letter", vec![]),
            item("a", "first letter", vec![]),
        ]);
        let ids: Vec<String> = store.all().map(|i| i.id.to_string()).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }

    #[test]
    fn test_jsonl_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.jsonl");

        let mut store = InMemoryEvidenceStore::new();
        store.insert(item("ev-1", "Water boils at 100 degrees", vec![0.5, 0.5]));
        store.insert(item("ev-2", "The Earth is an oblate spheroid", vec![]));
        store.save_jsonl(&path).unwrap();

        let loaded = InMemoryEvidenceStore::from_jsonl(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get_embedding(&"ev-1".into()), Some(vec![0.5, 0.5]));
        assert!(!loaded.get(&"ev-2".into()).unwrap().is_embedded());
    }

    #[test]
    fn test_jsonl_reports_bad_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.jsonl");
        std::fs::write(&path, "{\"id\": \"ok\", \"text\": \"fine\"}\n\nnot json\n").unwrap();

        let err = InMemoryEvidenceStore::from_jsonl(&path).unwrap_err();
        assert!(err.to_string().contains(":3"));
    }
}
