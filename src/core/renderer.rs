//! Tutorial rendering
//!
//! Turns the assembled tutorial model into Markdown files on disk. The
//! templates are embedded so the binary stays self-contained; `.md`
//! template names keep Tera's HTML autoescaping out of the way.

use std::path::PathBuf;

use chrono::Utc;
use tera::{Context, Tera};
use tracing::info;

use crate::config::OutputConfig;
use crate::error::Result;

use super::assembler::Tutorial;

const INDEX_TEMPLATE: &str = r#"# {{ project_name }} Tutorial

{{ summary }}
{% if diagram %}
## How the pieces fit together

```mermaid
{{ diagram }}```
{% endif %}
## Chapters

{% for entry in entries -%}
{{ loop.index }}. [{{ entry.title }}]({{ entry.filename }}) - {{ entry.difficulty }}{% if entry.status == "partial" %} *(partially generated)*{% elif entry.status == "failed" %} *(unavailable)*{% endif %}
{% endfor %}
{%- if generated_at %}
---

*Generated on {{ generated_at }}.*
{% endif -%}
"#;

const CHAPTER_TEMPLATE: &str = r#"# Chapter {{ number }}: {{ title }}

*Difficulty: {{ difficulty }}*
{% if prerequisites %}
> Builds on: {% for p in prerequisites %}[{{ p.title }}]({{ p.filename }}){% if not loop.last %}, {% endif %}{% endfor %}
{% endif %}
{{ body }}

---

{% if prev %}[Previous]({{ prev }}) | {% endif %}[Index](index.md){% if next %} | [Next]({{ next }}){% endif %}
"#;

/// Destination abstraction for the assembled tutorial
pub trait TutorialWriter {
    /// Write the tutorial out and report where the index landed
    fn write(&self, tutorial: &Tutorial) -> Result<PathBuf>;
}

/// Renders the tutorial into a directory of Markdown files
pub struct FileSystemWriter {
    config: OutputConfig,
    tera: Tera,
}

impl FileSystemWriter {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("index.md", INDEX_TEMPLATE)?;
        tera.add_raw_template("chapter.md", CHAPTER_TEMPLATE)?;
        Ok(Self {
            config: config.clone(),
            tera,
        })
    }

    /// Output directory override, used by the CLI's --output flag
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.dir = dir.into();
        self
    }

    fn render_index(&self, tutorial: &Tutorial) -> Result<String> {
        let mut context = Context::from_serialize(&tutorial.index)?;
        if self.config.include_metadata {
            context.insert("generated_at", &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string());
        } else {
            context.insert("generated_at", &false);
        }
        Ok(self.tera.render("index.md", &context)?)
    }

    fn render_chapter(&self, chapter: &super::assembler::ChapterFile) -> Result<String> {
        let mut context = Context::from_serialize(chapter)?;
        context.insert("number", &(chapter.index + 1));
        Ok(self.tera.render("chapter.md", &context)?)
    }
}

impl TutorialWriter for FileSystemWriter {
    fn write(&self, tutorial: &Tutorial) -> Result<PathBuf> {
        let dir = &self.config.dir;
        std::fs::create_dir_all(dir)?;

        let index_path = dir.join("index.md");
        std::fs::write(&index_path, self.render_index(tutorial)?)?;

        for chapter in &tutorial.chapters {
            let rendered = self.render_chapter(chapter)?;
            std::fs::write(dir.join(&chapter.filename), rendered)?;
        }

        info!(
            "📚 Wrote {} chapters to {}",
            tutorial.chapters.len(),
            dir.display()
        );
        Ok(index_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assembler::{ChapterFile, IndexDocument, TocEntry};
    use crate::core::generator::GenerationStatus;

    fn tutorial() -> Tutorial {
        Tutorial {
            index: IndexDocument {
                project_name: "demo".to_string(),
                summary: "A short walk through demo.".to_string(),
                diagram: "graph TD\n    a[\"Alpha\"]\n".to_string(),
                entries: vec![
                    TocEntry {
                        filename: "01-first.md".to_string(),
                        title: "First".to_string(),
                        difficulty: "beginner".to_string(),
                        status: GenerationStatus::Complete,
                    },
                    TocEntry {
                        filename: "02-second.md".to_string(),
                        title: "Second".to_string(),
                        difficulty: "intermediate".to_string(),
                        status: GenerationStatus::Failed,
                    },
                ],
            },
            chapters: vec![
                ChapterFile {
                    index: 0,
                    filename: "01-first.md".to_string(),
                    title: "First".to_string(),
                    difficulty: "beginner".to_string(),
                    prerequisites: vec![],
                    body: "### Alpha\n\nprose".to_string(),
                    status: GenerationStatus::Complete,
                    prev: None,
                    next: Some("02-second.md".to_string()),
                },
                ChapterFile {
                    index: 1,
                    filename: "02-second.md".to_string(),
                    title: "Second".to_string(),
                    difficulty: "intermediate".to_string(),
                    prerequisites: vec![TocEntry {
                        filename: "01-first.md".to_string(),
                        title: "First".to_string(),
                        difficulty: "beginner".to_string(),
                        status: GenerationStatus::Complete,
                    }],
                    body: "_Content for this chapter could not be generated. Re-run the \
                           pipeline to fill it in._"
                        .to_string(),
                    status: GenerationStatus::Failed,
                    prev: Some("01-first.md".to_string()),
                    next: None,
                },
            ],
        }
    }

    fn writer(dir: &std::path::Path) -> FileSystemWriter {
        let mut config = crate::config::Config::default().output;
        config.dir = dir.to_path_buf();
        FileSystemWriter::new(&config).unwrap()
    }

    #[test]
    fn writes_index_and_all_chapter_files() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = writer(dir.path()).write(&tutorial()).unwrap();

        let index = std::fs::read_to_string(&index_path).unwrap();
        assert!(index.contains("# demo Tutorial"));
        assert!(index.contains("[First](01-first.md)"));
        assert!(index.contains("*(unavailable)*"));
        assert!(index.contains("```mermaid"));

        let first = std::fs::read_to_string(dir.path().join("01-first.md")).unwrap();
        assert!(first.contains("# Chapter 1: First"));
        assert!(first.contains("[Next](02-second.md)"));
        assert!(!first.contains("[Previous]"));

        let second = std::fs::read_to_string(dir.path().join("02-second.md")).unwrap();
        assert!(second.contains("Builds on: [First](01-first.md)"));
        assert!(second.contains("[Previous](01-first.md)"));
        assert!(second.contains("could not be generated"));
    }

    #[test]
    fn metadata_stamp_follows_the_config_switch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::Config::default().output;
        config.dir = dir.path().to_path_buf();
        config.include_metadata = false;
        let writer = FileSystemWriter::new(&config).unwrap();

        let index_path = writer.write(&tutorial()).unwrap();
        let index = std::fs::read_to_string(index_path).unwrap();
        assert!(!index.contains("Generated on"));
    }
}
