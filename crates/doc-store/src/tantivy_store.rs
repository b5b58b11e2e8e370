use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use core_types::{DocId, DocumentRecord};
use tantivy::collector::DocSetCollector;
use tantivy::query::TermSetQuery;
use tantivy::schema::{Field, NumericOptions, STORED, Schema, Value};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, Term};

use crate::{DocumentStore, StoreError};

const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, Clone, Copy)]
struct Fields {
    uid: Field,
    title: Field,
    content: Field,
    extra: Field,
}

impl Fields {
    fn from_schema(schema: &Schema) -> Result<Self, StoreError> {
        let get = |name: &str| {
            schema
                .get_field(name)
                .map_err(|e| StoreError::Corrupt(format!("schema field {name}: {e}")))
        };
        Ok(Self {
            uid: get("uid")?,
            title: get("title")?,
            content: get("content")?,
            extra: get("extra")?,
        })
    }
}

/// `uid` is indexed for the batched lookup; everything else is stored only.
fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_i64_field(
        "uid",
        NumericOptions::default().set_indexed().set_stored().set_fast(),
    );
    builder.add_text_field("title", STORED);
    builder.add_text_field("content", STORED);
    builder.add_text_field("extra", STORED);
    builder.build()
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("{context}: {err}"))
}

/// Read side of the tantivy store. The reader is opened once and reused for
/// every lookup; dropping the store releases it.
pub struct TantivyDocStore {
    dir: PathBuf,
    reader: IndexReader,
    fields: Fields,
}

impl TantivyDocStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let index = Index::open_in_dir(dir)
            .map_err(|e| unavailable(&format!("open {}", dir.display()), e))?;
        let fields = Fields::from_schema(&index.schema())?;
        let reader = index
            .reader()
            .map_err(|e| unavailable("create index reader", e))?;
        tracing::info!(
            path = %dir.display(),
            documents = reader.searcher().num_docs(),
            "document store opened"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            reader,
            fields,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn decode(&self, doc: &TantivyDocument) -> Result<DocumentRecord, StoreError> {
        let text = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let id = doc
            .get_first(self.fields.uid)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| StoreError::Corrupt("stored document without uid".into()))?;

        let raw_extra = text(self.fields.extra);
        let extra = if raw_extra.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&raw_extra)
                .map_err(|e| StoreError::Corrupt(format!("extra fields of uid {id}: {e}")))?
        };

        Ok(DocumentRecord {
            id,
            title: text(self.fields.title),
            content: text(self.fields.content),
            extra,
        })
    }
}

impl DocumentStore for TantivyDocStore {
    fn batch_get(&self, ids: &HashSet<DocId>) -> Result<HashMap<DocId, DocumentRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let searcher = self.reader.searcher();
        let terms = ids
            .iter()
            .map(|id| Term::from_field_i64(self.fields.uid, *id))
            .collect::<Vec<_>>();
        let query = TermSetQuery::new(terms);
        let addresses = searcher
            .search(&query, &DocSetCollector)
            .map_err(|e| unavailable("uid lookup", e))?;

        let mut found = HashMap::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| unavailable("fetch stored document", e))?;
            let record = self.decode(&doc)?;
            found.insert(record.id, record);
        }
        Ok(found)
    }
}

/// Write side: creates a fresh store directory and upserts records by uid.
pub struct TantivyDocStoreWriter {
    writer: IndexWriter,
    fields: Fields,
    added: usize,
}

impl TantivyDocStoreWriter {
    /// Create a store at `dir`. An existing tantivy index there is replaced;
    /// any other non-empty directory is refused.
    pub fn create(dir: &Path) -> Result<Self, StoreError> {
        let io_err = |source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        };
        if dir.exists() {
            if dir.join("meta.json").exists() {
                tracing::info!(path = %dir.display(), "replacing existing document store");
                fs::remove_dir_all(dir).map_err(io_err)?;
            } else if fs::read_dir(dir).map_err(io_err)?.next().is_some() {
                return Err(StoreError::Unavailable(format!(
                    "{} exists and is not a document store",
                    dir.display()
                )));
            }
        }
        fs::create_dir_all(dir).map_err(io_err)?;

        let schema = build_schema();
        let index = Index::create_in_dir(dir, schema.clone())
            .map_err(|e| unavailable(&format!("create {}", dir.display()), e))?;
        let writer: IndexWriter = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| unavailable("create index writer", e))?;
        Ok(Self {
            writer,
            fields: Fields::from_schema(&schema)?,
            added: 0,
        })
    }

    pub fn add(&mut self, record: &DocumentRecord) -> Result<(), StoreError> {
        let extra = serde_json::to_string(&record.extra)
            .map_err(|e| StoreError::Corrupt(format!("extra fields of uid {}: {e}", record.id)))?;

        self.writer
            .delete_term(Term::from_field_i64(self.fields.uid, record.id));
        let mut doc = TantivyDocument::default();
        doc.add_i64(self.fields.uid, record.id);
        doc.add_text(self.fields.title, &record.title);
        doc.add_text(self.fields.content, &record.content);
        doc.add_text(self.fields.extra, &extra);
        self.writer
            .add_document(doc)
            .map_err(|e| unavailable("add document", e))?;
        self.added += 1;
        Ok(())
    }

    /// Commit and wait for merges; returns the number of records written.
    pub fn commit(mut self) -> Result<usize, StoreError> {
        self.writer
            .commit()
            .map_err(|e| unavailable("commit", e))?;
        self.writer
            .wait_merging_threads()
            .map_err(|e| unavailable("merge", e))?;
        Ok(self.added)
    }
}
