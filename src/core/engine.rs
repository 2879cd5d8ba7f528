// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use super::{
    create_client, AbstractionExtractor, Abstraction, ChapterPlan, ContentGenerator,
    DependencyGraph, FileSystemWriter, LearningPathPlanner, LocalDirMaterializer,
    ProjectMetadata, RelationshipAnalyzer, SourceMaterializer, StubClient, TutorialAssembler,
    TutorialWriter,
};

/// Main orchestration engine: runs the pipeline stages in order and
/// validates the hand-off between them
pub struct Engine {
    config: Config,
    extractor: AbstractionExtractor,
    analyzer: RelationshipAnalyzer,
    planner: LearningPathPlanner,
    assembler: TutorialAssembler,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        let extractor = AbstractionExtractor::new(&config.extraction)?;
        let analyzer = RelationshipAnalyzer::new(&config.analysis);
        let planner = LearningPathPlanner::new(&config.planning);
        let assembler = TutorialAssembler::new(&config.analysis);

        Ok(Self {
            config,
            extractor,
            analyzer,
            planner,
            assembler,
        })
    }

    /// Write a starter Codetutor.toml into the target directory
    pub async fn init(&self, path: Option<PathBuf>, non_interactive: bool) -> Result<()> {
        let target_dir = match path {
            Some(p) => p,
            None => std::env::current_dir()?,
        };
        let config_path = target_dir.join("Codetutor.toml");

        if config_path.exists() {
            warn!(
                "Configuration already exists at {}, leaving it untouched",
                config_path.display()
            );
            return Ok(());
        }

        Config::default().save(&config_path)?;
        info!("✅ Wrote starter configuration to {}", config_path.display());
        if !non_interactive {
            info!("Edit llm.provider and llm.model before the first generate run");
        }
        Ok(())
    }

    /// Run stages 1-3 and print the learning path without calling any LLM
    pub async fn plan(&mut self, source: Option<PathBuf>, json: bool) -> Result<()> {
        let source_dir = resolve_source(source)?;
        let (_, abstractions, _, plan) = self.analyze_source(&source_dir)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            return Ok(());
        }

        for chapter in &plan.chapters {
            let members: Vec<&str> = chapter
                .members
                .iter()
                .filter_map(|id| {
                    abstractions
                        .iter()
                        .find(|a| &a.id == id)
                        .map(|a| a.name.as_str())
                })
                .collect();
            println!(
                "{:>2}. {} [{}]: {}",
                chapter.index + 1,
                chapter.title,
                chapter.difficulty.label(),
                members.join(", ")
            );
        }
        Ok(())
    }

    /// Run the full pipeline and write the tutorial to disk
    pub async fn generate(
        &mut self,
        source: Option<PathBuf>,
        output: Option<PathBuf>,
        skip_llm: bool,
    ) -> Result<()> {
        let source_dir = resolve_source(source)?;
        info!("🔍 Analyzing {}", source_dir.display());

        let (project, abstractions, graph, plan) = self.analyze_source(&source_dir)?;

        let client = if skip_llm {
            info!("Skipping LLM calls; producing a tutorial skeleton");
            Arc::new(StubClient) as Arc<dyn super::LlmClient>
        } else {
            let client = create_client(&self.config.llm)?;
            info!(
                "✅ LLM provider ready: {} ({})",
                client.provider_name(),
                client.model_name()
            );
            client
        };

        info!("✍️ Generating chapter content...");
        let generator = ContentGenerator::new(client, &self.config.generation);
        let (documents, summary) = generator
            .generate(&plan, &abstractions, &graph, &project)
            .await?;

        let tutorial = self
            .assembler
            .assemble(&project, &plan, &graph, &documents, &abstractions)?;

        let mut writer = FileSystemWriter::new(&self.config.output)?;
        if let Some(dir) = output {
            writer = writer.with_dir(dir);
        }
        let index_path = writer.write(&tutorial)?;

        info!("📊 Run summary:");
        info!("  - {} abstractions across {} files", abstractions.len(), project.file_count);
        info!("  - {} relationships retained", graph.edges.len());
        info!(
            "  - {} chapters ({} complete, {} partial, {} failed)",
            plan.chapters.len(),
            summary.complete_chapters,
            summary.partial_chapters,
            summary.failed_chapters
        );
        if !summary.failed_sections.is_empty() {
            warn!(
                "  - sections without content: {}",
                summary.failed_sections.join(", ")
            );
        }
        for warning in &graph.warnings {
            warn!("  - {}", warning);
        }
        info!("📚 Tutorial index at {}", index_path.display());
        Ok(())
    }

    /// Stages 1-3: materialize, extract, analyze, plan. Each boundary is
    /// validated before the next stage runs.
    fn analyze_source(
        &mut self,
        source_dir: &Path,
    ) -> Result<(ProjectMetadata, Vec<Abstraction>, DependencyGraph, ChapterPlan)> {
        let materializer = LocalDirMaterializer::new(
            source_dir,
            &self.config.project,
            self.config.extraction.max_file_size,
        );
        let files = materializer.materialize()?;
        let name = self
            .config
            .project
            .name
            .clone()
            .unwrap_or_else(|| materializer.project_name());
        let project = super::project_metadata(name, &files);
        info!(
            "📖 Materialized {} source files (primary language: {})",
            project.file_count, project.primary_language
        );

        let outcome = self.extractor.extract(&files)?;
        info!("🧩 Extracted {} abstractions", outcome.abstractions.len());
        for warning in &outcome.warnings {
            warn!("  - {}: {}", warning.file.display(), warning.reason);
        }

        let graph = self.analyzer.analyze(&outcome.abstractions)?;
        info!("🔗 Inferred {} relationships", graph.edges.len());

        let plan = self.planner.plan(&outcome.abstractions, &graph)?;
        info!("🗺️ Planned {} chapters", plan.chapters.len());

        Ok((project, outcome.abstractions, graph, plan))
    }
}

fn resolve_source(source: Option<PathBuf>) -> Result<PathBuf> {
    match source {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}
