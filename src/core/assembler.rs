//! Tutorial assembly
//!
//! Takes the chapter plan, the dependency graph and the generated chapter
//! documents and produces a navigable tutorial model: one index document
//! with a project summary, a relationship diagram and an ordered table of
//! contents, plus one file entry per chapter with previous/next links.
//! Rendering to disk is the writer's job.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::{Result, TutorError};

use super::analyzer::DependencyGraph;
use super::extractor::Abstraction;
use super::generator::{ChapterDocument, GenerationStatus};
use super::planner::ChapterPlan;
use super::source::ProjectMetadata;

/// One entry in the index's ordered table of contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocEntry {
    pub filename: String,
    pub title: String,
    pub difficulty: String,
    pub status: GenerationStatus,
}

/// The tutorial's entry point document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    pub project_name: String,
    pub summary: String,

    /// Mermaid source for the abstraction relationship diagram
    pub diagram: String,

    pub entries: Vec<TocEntry>,
}

/// One chapter artifact, ready for rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterFile {
    pub index: usize,
    pub filename: String,
    pub title: String,
    pub difficulty: String,

    /// Titles of prerequisite chapters, each paired with its filename
    pub prerequisites: Vec<TocEntry>,

    pub body: String,
    pub status: GenerationStatus,

    pub prev: Option<String>,
    pub next: Option<String>,
}

/// Assembled tutorial, one index plus ordered chapter files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tutorial {
    pub index: IndexDocument,
    pub chapters: Vec<ChapterFile>,
}

pub struct TutorialAssembler {
    config: AnalysisConfig,
}

impl TutorialAssembler {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn assemble(
        &self,
        project: &ProjectMetadata,
        plan: &ChapterPlan,
        graph: &DependencyGraph,
        documents: &[ChapterDocument],
        abstractions: &[Abstraction],
    ) -> Result<Tutorial> {
        if documents.len() != plan.chapters.len() {
            return Err(TutorError::invariant(
                "assembly",
                format!(
                    "{} chapter documents for {} planned chapters",
                    documents.len(),
                    plan.chapters.len()
                ),
            ));
        }

        let filenames: Vec<String> = plan
            .chapters
            .iter()
            .map(|c| format!("{:02}-{}.md", c.index + 1, slugify(&c.title)))
            .collect();

        let mut chapters = Vec::with_capacity(documents.len());
        for (position, (chapter, document)) in
            plan.chapters.iter().zip(documents.iter()).enumerate()
        {
            if chapter.index != document.index {
                return Err(TutorError::invariant(
                    "assembly",
                    format!(
                        "chapter document {} arrived in slot {}",
                        document.index, chapter.index
                    ),
                ));
            }

            let body = match document.status {
                GenerationStatus::Failed => {
                    debug!("Chapter {} rendered as unavailable", chapter.index);
                    "_Content for this chapter could not be generated. Re-run the \
                     pipeline to fill it in._"
                        .to_string()
                }
                _ => document.body.clone(),
            };

            let prerequisites = chapter
                .prerequisites
                .iter()
                .map(|&p| TocEntry {
                    filename: filenames[p].clone(),
                    title: plan.chapters[p].title.clone(),
                    difficulty: plan.chapters[p].difficulty.label().to_string(),
                    status: documents[p].status,
                })
                .collect();

            chapters.push(ChapterFile {
                index: chapter.index,
                filename: filenames[position].clone(),
                title: chapter.title.clone(),
                difficulty: chapter.difficulty.label().to_string(),
                prerequisites,
                body,
                status: document.status,
                prev: position.checked_sub(1).map(|p| filenames[p].clone()),
                next: filenames.get(position + 1).cloned(),
            });
        }

        let entries = chapters
            .iter()
            .map(|c| TocEntry {
                filename: c.filename.clone(),
                title: c.title.clone(),
                difficulty: c.difficulty.clone(),
                status: c.status,
            })
            .collect();

        let index = IndexDocument {
            project_name: project.name.clone(),
            summary: self.project_summary(project, plan, abstractions),
            diagram: self.mermaid_diagram(graph, abstractions),
            entries,
        };

        Ok(Tutorial { index, chapters })
    }

    fn project_summary(
        &self,
        project: &ProjectMetadata,
        plan: &ChapterPlan,
        abstractions: &[Abstraction],
    ) -> String {
        format!(
            "This tutorial walks through **{}**, a {} codebase. It covers {} key \
             abstractions across {} chapters, ordered so that each chapter builds on \
             the ones before it.",
            project.name,
            project.primary_language,
            abstractions.len(),
            plan.chapters.len()
        )
    }

    /// Render the relationship neighborhood as a Mermaid flowchart.
    ///
    /// Nodes are abstractions touching at least one strong edge; rendered
    /// edges are those at or above the retention threshold whose both
    /// endpoints made it in. Keeps the diagram legible on large graphs.
    fn mermaid_diagram(&self, graph: &DependencyGraph, abstractions: &[Abstraction]) -> String {
        let mut included: BTreeSet<&str> = BTreeSet::new();
        for edge in graph.strong_edges(self.config.strong_cluster_threshold) {
            included.insert(&edge.source);
            included.insert(&edge.target);
        }

        if included.is_empty() {
            return String::new();
        }

        let mut diagram = String::from("graph TD\n");
        for abstraction in abstractions {
            if included.contains(abstraction.id.as_str()) {
                diagram.push_str(&format!(
                    "    {}[\"{}\"]\n",
                    abstraction.id,
                    abstraction.name.replace('"', "'")
                ));
            }
        }
        for edge in &graph.edges {
            if edge.strength >= self.config.min_relationship_strength
                && included.contains(edge.source.as_str())
                && included.contains(edge.target.as_str())
            {
                diagram.push_str(&format!(
                    "    {} -->|{}| {}\n",
                    edge.source,
                    edge.kind.label(),
                    edge.target
                ));
            }
        }
        diagram
    }
}

/// Lowercase, alphanumerics kept, everything else collapsed to single dashes
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analyzer::{RelationKind, Relationship};
    use crate::core::extractor::AbstractionKind;
    use crate::core::planner::{Chapter, Difficulty};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn abstraction(id: &str, name: &str) -> Abstraction {
        Abstraction {
            id: id.to_string(),
            name: name.to_string(),
            kind: AbstractionKind::Class,
            file: PathBuf::from("demo.py"),
            line: 1,
            module: "demo".to_string(),
            language: "python".to_string(),
            doc: None,
            members: vec![],
            imports: vec![],
            supertypes: vec![],
            complexity: 3,
            body: String::new(),
        }
    }

    fn chapter(index: usize, title: &str, members: &[&str], prerequisites: &[usize]) -> Chapter {
        Chapter {
            index,
            title: title.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            difficulty: Difficulty::Beginner,
            prerequisites: prerequisites.to_vec(),
        }
    }

    fn document(index: usize, title: &str, status: GenerationStatus) -> ChapterDocument {
        ChapterDocument {
            index,
            title: title.to_string(),
            body: "prose".to_string(),
            covered: vec![],
            status,
        }
    }

    fn empty_graph() -> DependencyGraph {
        DependencyGraph {
            edges: vec![],
            ordering_edges: vec![],
            clusters: HashMap::new(),
            warnings: vec![],
        }
    }

    fn project() -> ProjectMetadata {
        ProjectMetadata {
            name: "demo".to_string(),
            primary_language: "python".to_string(),
            file_count: 2,
        }
    }

    fn assembler() -> TutorialAssembler {
        TutorialAssembler::new(&crate::config::Config::default().analysis)
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Understanding Planner (class)"), "understanding-planner-class");
        assert_eq!(slugify("  --Weird--  Title!  "), "weird-title");
    }

    #[test]
    fn navigation_links_chain_through_all_chapters() {
        let plan = ChapterPlan {
            chapters: vec![
                chapter(0, "First Steps", &["id_a"], &[]),
                chapter(1, "Deeper Waters", &["id_b"], &[0]),
                chapter(2, "The Summit", &["id_c"], &[1]),
            ],
        };
        let documents = vec![
            document(0, "First Steps", GenerationStatus::Complete),
            document(1, "Deeper Waters", GenerationStatus::Complete),
            document(2, "The Summit", GenerationStatus::Complete),
        ];
        let abstractions = vec![
            abstraction("id_a", "Alpha"),
            abstraction("id_b", "Beta"),
            abstraction("id_c", "Gamma"),
        ];

        let tutorial = assembler()
            .assemble(&project(), &plan, &empty_graph(), &documents, &abstractions)
            .unwrap();

        assert_eq!(tutorial.chapters[0].filename, "01-first-steps.md");
        assert_eq!(tutorial.chapters[0].prev, None);
        assert_eq!(
            tutorial.chapters[0].next.as_deref(),
            Some("02-deeper-waters.md")
        );
        assert_eq!(
            tutorial.chapters[1].prev.as_deref(),
            Some("01-first-steps.md")
        );
        assert_eq!(tutorial.chapters[2].next, None);
        assert_eq!(
            tutorial.chapters[1].prerequisites[0].filename,
            "01-first-steps.md"
        );
        assert_eq!(tutorial.index.entries.len(), 3);
    }

    #[test]
    fn failed_chapter_keeps_its_slot_with_a_marker() {
        let plan = ChapterPlan {
            chapters: vec![
                chapter(0, "Working", &["id_a"], &[]),
                chapter(1, "Broken", &["id_b"], &[]),
            ],
        };
        let documents = vec![
            document(0, "Working", GenerationStatus::Complete),
            ChapterDocument {
                index: 1,
                title: "Broken".to_string(),
                body: String::new(),
                covered: vec![],
                status: GenerationStatus::Failed,
            },
        ];
        let abstractions = vec![abstraction("id_a", "Alpha"), abstraction("id_b", "Beta")];

        let tutorial = assembler()
            .assemble(&project(), &plan, &empty_graph(), &documents, &abstractions)
            .unwrap();

        assert_eq!(tutorial.chapters.len(), 2);
        assert!(tutorial.chapters[1].body.contains("could not be generated"));
        assert_eq!(tutorial.index.entries[1].status, GenerationStatus::Failed);
    }

    #[test]
    fn diagram_only_includes_strongly_connected_abstractions() {
        let graph = DependencyGraph {
            edges: vec![
                Relationship {
                    source: "id_a".to_string(),
                    target: "id_b".to_string(),
                    kind: RelationKind::Imports,
                    strength: 1.0,
                },
                Relationship {
                    source: "id_b".to_string(),
                    target: "id_c".to_string(),
                    kind: RelationKind::Calls,
                    strength: 0.2,
                },
            ],
            ordering_edges: vec![],
            clusters: HashMap::new(),
            warnings: vec![],
        };
        let abstractions = vec![
            abstraction("id_a", "Alpha"),
            abstraction("id_b", "Beta"),
            abstraction("id_c", "Gamma"),
        ];

        let diagram = assembler().mermaid_diagram(&graph, &abstractions);
        assert!(diagram.contains("id_a[\"Alpha\"]"));
        assert!(diagram.contains("id_b[\"Beta\"]"));
        assert!(!diagram.contains("id_c"));
        assert!(diagram.contains("id_a -->|imports| id_b"));
        assert!(!diagram.contains("id_b -->"));
    }

    #[test]
    fn mismatched_document_count_is_fatal() {
        let plan = ChapterPlan {
            chapters: vec![chapter(0, "Only", &["id_a"], &[])],
        };
        let result = assembler().assemble(
            &project(),
            &plan,
            &empty_graph(),
            &[],
            &[abstraction("id_a", "Alpha")],
        );
        assert!(result.is_err());
    }
}
