pub mod cell_update;
pub mod directory;
pub mod event;
pub mod extractor;
pub mod line;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod router;
pub mod service;
pub mod source_tag;
pub mod store;
pub mod worker;

pub use directory::{Directory, DisplayNameResolver, UNKNOWN_ACTOR};
pub use event::{ChatEvent, EventSource, MessageContent, SourceKind};
pub use extractor::{DelegatedExtractor, ExtractError, Extractor, PatternExtractor, ResponseFormat};
pub use pipeline::{BatchOutcome, EventOutcome, PipelineError, ReportDate, ReportPipeline};
pub use report::{assemble_row, ExtractedReport};
pub use router::{Action, EventRouter, IgnoreReason};
pub use store::{SheetLayout, SheetStore, StoreError};
pub use worker::{spawn_batch_worker, BatchQueue, BatchWorker, WorkerError};
