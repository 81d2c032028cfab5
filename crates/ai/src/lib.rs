pub mod extractor;
pub mod provider;
pub mod schema;

pub use extractor::{ExtractedEvent, ExtractedItems, ExtractedTask, StructuredExtractor, SummaryDraft};
pub use provider::{AiProvider, ChatMessage, ChatRequest, ChatResponse, ProviderRegistry, ProviderStatus};
