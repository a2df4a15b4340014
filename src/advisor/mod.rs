//! Conversation advice from a text-generation service.

pub mod ollama;
pub mod request;
pub mod service;
pub mod worker;

pub use ollama::OllamaAdvisor;
pub use request::{AdvisoryRequest, advisory_window};
pub use service::{AdvisoryService, FALLBACK_ADVICE, MockAdvisor};
pub use worker::{Advice, AdvisorState, AdvisorWorker, advice_slot};
