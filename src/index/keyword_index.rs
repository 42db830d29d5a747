/// Tantivy keyword index for lexical evidence matching
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, QueryParser};
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError};
use thiserror::Error;

use crate::text::tokenize;
use crate::types::{EvidenceId, EvidenceItem};

/// Fuzzy clauses only apply to terms at least this long
const FUZZY_MIN_TERM_LEN: usize = 5;
/// Fuzzy matches count for a fraction of an exact BM25 match
const FUZZY_BOOST: f32 = 0.25;
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

/// Search result with ID and relevance score
#[derive(Debug, Clone)]
pub struct KeywordSearchResult {
    pub id: EvidenceId,
    /// BM25 relevance score (unbounded, higher is better)
    pub score: f32,
}

/// In-memory BM25 index over evidence text
///
/// Built once from a full evidence set and read-only afterwards; the writer is
/// dropped after the single commit so searches never contend with indexing.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    id_field: Field,
    text_field: Field,
    fuzzy: bool,
    len: u64,
}

impl KeywordIndex {
    /// Build an index over `items`
    ///
    /// # Arguments
    /// * `items` - Evidence to index (id and text)
    /// * `fuzzy` - Also match query terms within edit distance 1
    pub fn build<'a>(
        items: impl IntoIterator<Item = &'a EvidenceItem>,
        fuzzy: bool,
    ) -> Result<Self, KeywordIndexError> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let mut len = 0u64;
        for item in items {
            writer
                .add_document(doc!(
                    id_field => item.id.as_str(),
                    text_field => item.text.as_str(),
                ))
                .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
            len += 1;
        }

        writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        drop(writer);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: TantivyError| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            id_field,
            text_field,
            fuzzy,
            len,
        })
    }

    /// An index with no documents
    pub fn empty() -> Result<Self, KeywordIndexError> {
        Self::build(std::iter::empty(), false)
    }

    /// Search the index with free text
    ///
    /// Query syntax errors in `query` are ignored (claims are prose, not query
    /// language). Returns at most `limit` results sorted by relevance.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KeywordSearchResult>, KeywordIndexError> {
        if limit == 0 || self.len == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query = self.build_query(query);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let id = retrieved_doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    KeywordIndexError::SearchError("Missing or invalid ID field".to_string())
                })?;

            results.push(KeywordSearchResult {
                id: EvidenceId::new(id),
                score,
            });
        }

        Ok(results)
    }

    fn build_query(&self, text: &str) -> Box<dyn Query> {
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (parsed, errors) = parser.parse_query_lenient(text);
        if !errors.is_empty() {
            tracing::trace!("Ignored {} query syntax errors", errors.len());
        }

        if !self.fuzzy {
            return parsed;
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Should, parsed)];
        let mut seen = std::collections::BTreeSet::new();
        for token in tokenize(text) {
            if token.chars().count() < FUZZY_MIN_TERM_LEN || !seen.insert(token.clone()) {
                continue;
            }
            let term = Term::from_field_text(self.text_field, &token);
            let fuzzy: Box<dyn Query> = Box::new(FuzzyTermQuery::new(term, 1, true));
            clauses.push((Occur::Should, Box::new(BoostQuery::new(fuzzy, FUZZY_BOOST))));
        }

        Box::new(BooleanQuery::new(clauses))
    }

    /// Get the number of documents in the index
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for KeywordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordIndex")
            .field("len", &self.len)
            .field("fuzzy", &self.fuzzy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<EvidenceItem> {
        vec![
            EvidenceItem::new("1", "The quick brown fox jumps over the lazy dog", "test", vec![]),
            EvidenceItem::new("2", "A fast red fox leaps above a sleepy canine", "test", vec![]),
            EvidenceItem::new("3", "Python programming language tutorial", "test", vec![]),
        ]
    }

    #[test]
    fn test_empty_index() {
        let index = KeywordIndex::empty().unwrap();
        assert!(index.is_empty());
        assert!(index.search("fox", 10).unwrap().is_empty());
    }

    #[test]
    fn test_build_and_search() {
        let items = items();
        let index = KeywordIndex::build(&items, false).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search("fox", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].id.as_str() == "1" || results[0].id.as_str() == "2");

        let results = index.search("python", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.as_str(), "3");
    }

    #[test]
    fn test_prose_with_query_syntax_does_not_fail() {
        let items = items();
        let index = KeywordIndex::build(&items, false).unwrap();

        assert!(index.search("fox: (unbalanced \"quote AND", 10).is_ok());
        assert!(index.search("100°C at sea-level?", 10).is_ok());
    }

    #[test]
    fn test_fuzzy_matches_typos() {
        let items = items();
        let exact = KeywordIndex::build(&items, false).unwrap();
        let fuzzy = KeywordIndex::build(&items, true).unwrap();

        assert!(exact.search("pythom", 10).unwrap().is_empty());
        let results = fuzzy.search("pythom", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.as_str(), "3");
    }

    #[test]
    fn test_limit_zero() {
        let items = items();
        let index = KeywordIndex::build(&items, true).unwrap();
        assert!(index.search("fox", 0).unwrap().is_empty());
    }
}
