//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into task and character use-cases.
//! - Keep callers (API layers, the scheduler) decoupled from storage details.

pub mod character_service;
pub mod error;
pub mod task_service;

pub use character_service::{decay_multiplier, CharacterService, CharacterSnapshot, DecayOutcome};
pub use error::{EngineError, EngineResult};
pub use task_service::{
    quick_tier, CompletionOutcome, FailOutcome, NewTask, QuickTaskOutcome, QuickTaskRequest,
    QuickTier, TaskPatch, TaskService,
};
