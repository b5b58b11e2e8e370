//! Service layer for mmsearch: logging bootstrap, collaborator wiring, the
//! query orchestrator, and offline corpus ingest.

pub mod bootstrap;
pub mod ingest;
mod logging;
pub mod orchestrator;

pub use bootstrap::Collaborators;
pub use ingest::{IngestOptions, IngestReport, build_from_corpus};
pub use logging::{init_tracing, init_tracing_with_config};
pub use orchestrator::{QueryError, QueryOrchestrator, SearchOutcome, assemble_rows};
