//! Adaptive correction learning
//!
//! Command history, similarity-based correction detection, the persistent
//! personal dictionary and the prompt orchestrator that feeds it.

pub mod dictionary;
pub mod history;
pub mod prompts;
pub mod similarity;
pub mod storage;

pub use dictionary::{
    ConflictStrategy, DictionaryExport, DictionaryStatistics, ImportSummary, PersonalDictionary,
    PersonalDictionaryEntry, UserResponse,
};
pub use history::{CommandHistory, ExecutedCommand};
pub use prompts::{
    LearningEvent, LearningPromptData, LearningPromptOrchestrator, OrchestratorState,
    PromptAnalytics, PromptResponse, PromptState,
};
pub use similarity::{SimilarCommand, SimilarityEngine, SimilarityResult};
pub use storage::{DictionaryStorage, MemoryStorage, SqliteStorage};
