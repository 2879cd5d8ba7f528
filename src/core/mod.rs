mod engine;
mod source;
mod extractor;
mod analyzer;
mod planner;
mod generator;
mod assembler;
mod renderer;
mod llm;

pub use source::{
    detect_language, project_metadata, LocalDirMaterializer, ProjectMetadata, SourceFile,
    SourceMaterializer,
};
pub use extractor::{
    Abstraction, AbstractionExtractor, AbstractionKind, ExtractionOutcome, ExtractionWarning,
};
pub use analyzer::{DependencyGraph, RelationKind, Relationship, RelationshipAnalyzer};
pub use planner::{Chapter, ChapterPlan, Difficulty, LearningPathPlanner};
pub use generator::{ChapterDocument, ContentGenerator, GenerationStatus, GenerationSummary};
pub use assembler::{ChapterFile, IndexDocument, TocEntry, Tutorial, TutorialAssembler};
pub use renderer::{FileSystemWriter, TutorialWriter};
pub use llm::{create_client, build_section_prompt, LlmClient, LlmFailure, StubClient};

// Export the main engine
pub use engine::Engine;
