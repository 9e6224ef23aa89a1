pub mod api;
pub mod assembler;
pub mod bank_store;
pub mod config;
pub mod database;
pub mod errors;
pub mod generators;
pub mod llm_providers;
pub mod logging;
pub mod mastery;
pub mod models;
pub mod question_cache;
pub mod quiz_service;
pub mod retry;
pub mod signature;
pub mod source_fetcher;
pub mod subtopic_filter;


pub use assembler::QuizAssembler;
pub use database::Database;
pub use errors::*;
pub use generators::{GeneratorRegistry, QuestionGenerator};
pub use llm_providers::{JsonResponseParser, LLMProvider, LLMProviderType};
pub use mastery::MasteryModel;
pub use models::*;
pub use quiz_service::QuizService;
pub use source_fetcher::SourceFetcher;
