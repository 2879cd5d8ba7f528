use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::ProjectConfig;
use crate::error::{Result, TutorError};

/// One materialized source file handed to the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the repository root
    pub path: PathBuf,

    /// Full file content
    pub content: String,

    /// Detected language tag ("rust", "python", ...), or "unknown"
    pub language: String,
}

/// Project-level metadata derived from the materialized file list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Project display name
    pub name: String,

    /// Most common detected language across source files
    pub primary_language: String,

    /// Number of materialized source files
    pub file_count: usize,
}

/// Produces the finite, already-fetched file sequence the core consumes.
///
/// The core never performs source acquisition itself; anything that can
/// yield a file list (local tree, archive, remote clone) sits behind this
/// trait.
pub trait SourceMaterializer {
    fn materialize(&self) -> Result<Vec<SourceFile>>;

    fn project_name(&self) -> String;
}

/// Materializer for a local directory tree
pub struct LocalDirMaterializer {
    root: PathBuf,
    config: ProjectConfig,
    max_file_size: usize,
}

impl LocalDirMaterializer {
    pub fn new(root: impl Into<PathBuf>, config: &ProjectConfig, max_file_size: usize) -> Self {
        Self {
            root: root.into(),
            config: config.clone(),
            max_file_size,
        }
    }

    fn collect_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        if self.config.respect_gitignore {
            let walker = WalkBuilder::new(&self.root)
                .hidden(true)
                .git_ignore(true)
                .build();

            for entry in walker {
                let entry = entry.map_err(|e| TutorError::FileSystem(e.to_string()))?;
                if entry.path().is_file() {
                    paths.push(entry.path().to_path_buf());
                }
            }
        } else {
            for entry in WalkDir::new(&self.root) {
                let entry = entry.map_err(|e| TutorError::FileSystem(e.to_string()))?;
                if entry.path().is_file() {
                    paths.push(entry.path().to_path_buf());
                }
            }
        }

        paths.retain(|p| !self.is_ignored(p));
        // Walk order is filesystem-dependent; downstream determinism needs a
        // stable file order.
        paths.sort();
        Ok(paths)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let rendered = path.to_string_lossy();
        self.config
            .ignore_patterns
            .iter()
            .any(|pattern| rendered.contains(pattern.trim_end_matches('/')))
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

impl SourceMaterializer for LocalDirMaterializer {
    fn materialize(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();

        for path in self.collect_paths()? {
            let language = detect_language(&path);
            if language == "unknown" && !has_source_extension(&path) {
                continue;
            }

            let metadata = std::fs::metadata(&path)?;
            if metadata.len() as usize > self.max_file_size {
                continue;
            }

            // Binary or non-UTF8 files are not source material
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };

            files.push(SourceFile {
                path: self.relative_path(&path),
                content,
                language,
            });
        }

        Ok(files)
    }

    fn project_name(&self) -> String {
        if let Some(name) = &self.config.name {
            if !name.is_empty() {
                return name.clone();
            }
        }

        self.root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "unnamed-project".to_string())
    }
}

/// Detect the language tag from a file extension
pub fn detect_language(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("rs") => "rust".to_string(),
        Some("py") => "python".to_string(),
        Some("js") | Some("mjs") | Some("jsx") => "javascript".to_string(),
        Some("ts") | Some("tsx") => "typescript".to_string(),
        Some("go") => "go".to_string(),
        Some("java") => "java".to_string(),
        Some("rb") => "ruby".to_string(),
        Some("c") | Some("h") => "c".to_string(),
        Some("cpp") | Some("cc") | Some("hpp") => "cpp".to_string(),
        _ => "unknown".to_string(),
    }
}

fn has_source_extension(path: &Path) -> bool {
    path.extension().is_some()
}

/// Derive project metadata from the materialized file list
pub fn project_metadata(name: String, files: &[SourceFile]) -> ProjectMetadata {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for file in files {
        if file.language != "unknown" {
            *counts.entry(file.language.as_str()).or_insert(0) += 1;
        }
    }

    // Only recognized source files count toward the reported size
    let file_count = counts.values().sum();

    // Ties broken alphabetically so metadata is run-stable
    let primary_language = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(lang, _)| lang.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    ProjectMetadata {
        name,
        primary_language,
        file_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(path: &str, language: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(path),
            content: String::new(),
            language: language.to_string(),
        }
    }

    #[test]
    fn primary_language_is_the_most_common_one() {
        let files = vec![
            source("a.py", "python"),
            source("b.py", "python"),
            source("c.rs", "rust"),
        ];
        let meta = project_metadata("demo".to_string(), &files);
        assert_eq!(meta.primary_language, "python");
        assert_eq!(meta.file_count, 3);
    }

    #[test]
    fn unrecognized_files_do_not_inflate_the_file_count() {
        let files = vec![
            source("a.py", "python"),
            source("data.csv", "unknown"),
            source("config.toml", "unknown"),
        ];
        let meta = project_metadata("demo".to_string(), &files);
        assert_eq!(meta.file_count, 1);
        assert_eq!(meta.primary_language, "python");
    }

    #[test]
    fn language_detection_covers_known_extensions() {
        assert_eq!(detect_language(Path::new("src/lib.rs")), "rust");
        assert_eq!(detect_language(Path::new("app/main.py")), "python");
        assert_eq!(detect_language(Path::new("web/index.js")), "javascript");
        assert_eq!(detect_language(Path::new("README")), "unknown");
    }

    #[test]
    fn materializer_reads_a_local_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn hello() {}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not source\n").unwrap();

        let materializer = LocalDirMaterializer::new(
            dir.path(),
            &crate::config::Config::default().project,
            1024 * 1024,
        );
        let files = materializer.materialize().unwrap();

        assert_eq!(files.iter().filter(|f| f.language == "rust").count(), 1);
        assert_eq!(files[0].path, PathBuf::from("lib.rs"));
    }
}
