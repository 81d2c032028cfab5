//! Deterministic, offline text heuristics for incoming mail.

pub mod analyzer;

pub use analyzer::entities::{EntityTagger, RuleTagger};
pub use analyzer::HeuristicAnalyzer;
