//! Offline corpus ingest: one JSONL pass produces both the vector index file
//! and the document store it joins against.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use core_types::{DocId, DocumentRecord};
use core_types::config::{StoreBackend, StoreConfig};
use doc_store::{TantivyDocStoreWriter, read_jsonl};
use embedding::{Embedder, EmbeddingError};
use rayon::prelude::*;
use semantic_index::{BuildStats, HnswIndexBuilder};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// HNSW graph degree; `0` keeps the builder default.
    pub connectivity: usize,
    /// HNSW insertion breadth; `0` keeps the builder default.
    pub expansion_add: usize,
    /// Documents embedded per parallel batch (and per progress tick).
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            connectivity: 0,
            expansion_add: 0,
            batch_size: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub stored: usize,
    /// Documents with no embeddable text; stored but not indexed.
    pub skipped: usize,
    /// Earlier records replaced by a later one with the same uid.
    pub duplicates: usize,
    pub index: BuildStats,
}

/// Read `corpus`, embed every record, and write the index to `index_path` and
/// the records to the store described by `store`.
///
/// When a uid repeats, the last record wins in both the index and the store.
/// `progress(done, total)` is called on the calling thread after each batch.
pub fn build_from_corpus(
    corpus: &Path,
    embedder: &dyn Embedder,
    index_path: &Path,
    store: &StoreConfig,
    opts: &IngestOptions,
    mut progress: impl FnMut(usize, usize),
) -> Result<IngestReport> {
    let records =
        read_jsonl(corpus).with_context(|| format!("read corpus {}", corpus.display()))?;
    if records.is_empty() {
        bail!("corpus {} contains no documents", corpus.display());
    }
    let latest = latest_by_id(&records);
    let duplicates = records.len() - latest.len();
    if duplicates > 0 {
        warn!(duplicates, "corpus repeats uids; keeping the last record of each");
    }
    let total = latest.len();
    info!(corpus = %corpus.display(), documents = records.len(), model = embedder.model_id(), "ingest started");

    let mut builder = HnswIndexBuilder::new(embedder.dimension())
        .with_connectivity(opts.connectivity)
        .with_expansion_add(opts.expansion_add)
        .with_model(embedder.model_id());
    let mut skipped = 0;
    let mut done = 0;
    for batch in latest.chunks(opts.batch_size.max(1)) {
        let vectors: Vec<Result<Vec<f32>, EmbeddingError>> = batch
            .par_iter()
            .map(|r| embedder.embed_document(&r.embedding_text()))
            .collect();
        for (record, vector) in batch.iter().zip(vectors) {
            match vector {
                Ok(v) => builder.add(record.id, v)?,
                Err(EmbeddingError::EmptyInput) => {
                    warn!(uid = record.id, "document has no text; not indexed");
                    skipped += 1;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("embed document {}", record.id));
                }
            }
        }
        done += batch.len();
        progress(done, total);
    }

    let index = builder
        .write(index_path)
        .with_context(|| format!("write vector index {}", index_path.display()))?;
    let stored = write_store(store, &records)?;

    info!(
        documents = records.len(),
        indexed = index.vectors,
        stored,
        skipped,
        duplicates,
        "ingest finished"
    );
    Ok(IngestReport {
        documents: records.len(),
        stored,
        skipped,
        duplicates,
        index,
    })
}

fn write_store(cfg: &StoreConfig, records: &[DocumentRecord]) -> Result<usize> {
    let path = Path::new(&cfg.endpoint);
    match cfg.backend {
        StoreBackend::Tantivy => {
            let mut writer = TantivyDocStoreWriter::create(path)
                .with_context(|| format!("create document store {}", cfg.endpoint))?;
            for record in records {
                writer.add(record)?;
            }
            Ok(writer.commit()?)
        }
        StoreBackend::Jsonl => {
            let file = File::create(path)
                .with_context(|| format!("create document file {}", cfg.endpoint))?;
            let mut out = BufWriter::new(file);
            for record in records {
                serde_json::to_writer(&mut out, record)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
            Ok(records.len())
        }
    }
}

/// Last record for each uid, in corpus order of those last occurrences.
fn latest_by_id(records: &[DocumentRecord]) -> Vec<&DocumentRecord> {
    let mut seen: HashSet<DocId> = HashSet::with_capacity(records.len());
    let mut latest: Vec<&DocumentRecord> = records
        .iter()
        .rev()
        .filter(|r| seen.insert(r.id))
        .collect();
    latest.reverse();
    latest
}
