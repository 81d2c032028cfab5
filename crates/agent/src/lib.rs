pub mod engine;
pub mod pipeline;
pub mod scheduling;

pub use engine::queue::{TaskHandle, TaskQueue, TaskState};
pub use engine::reconcile::SyncReport;
pub use engine::SyncManager;
pub use pipeline::draft::DraftAssistant;
pub use pipeline::{BatchSummaryReport, EnrichmentPipeline, ExtractionReport, SummaryOptions, SummaryOutcome};
pub use scheduling::CalendarService;
