//! Abstraction extraction
//!
//! Turns the materialized file list into the language-agnostic abstraction
//! set every later stage works from. Leaf stage; parsing failures on
//! individual files are recorded as warnings and never abort the run.

pub mod languages;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::error::{Result, TutorError};
use languages::{
    GenericHeuristicParser, JavaScriptParser, LanguageParser, ParsedSource, PythonParser,
    RawDeclaration, RustParser,
};

use super::source::SourceFile;

/// Kind of code-level construct an abstraction represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractionKind {
    Module,
    Class,
    Function,
    Interface,
    Other,
}

impl AbstractionKind {
    fn from_raw(kind: &str) -> Self {
        match kind {
            "module" => Self::Module,
            "class" | "struct" | "enum" => Self::Class,
            "function" | "method" => Self::Function,
            "interface" | "trait" => Self::Interface,
            _ => Self::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Interface => "interface",
            Self::Other => "other",
        }
    }
}

/// One discovered unit of code-level meaning.
///
/// Created once by the extractor and immutable thereafter; every later
/// stage refers to it by identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Abstraction {
    /// Stable identifier, unique within a run
    pub id: String,

    /// Display name
    pub name: String,

    /// Construct kind
    pub kind: AbstractionKind,

    /// Source file path relative to the repository root
    pub file: PathBuf,

    /// 1-based starting line number
    pub line: usize,

    /// Declaring module name (file stem), used for import matching
    pub module: String,

    /// Detected language tag
    pub language: String,

    /// Free-text documentation, if any
    pub doc: Option<String>,

    /// Ordered member names (methods/fields)
    pub members: Vec<String>,

    /// Module names referenced by the declaring file's imports
    pub imports: Vec<String>,

    /// Declared supertype / interface names
    pub supertypes: Vec<String>,

    /// Complexity score in 1..=10, derived deterministically from
    /// structural size
    pub complexity: u8,

    /// Declaration body text, kept for reference scanning
    pub body: String,
}

/// Recoverable-local extraction failure for a single file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionWarning {
    pub file: PathBuf,
    pub reason: String,
}

/// Full output of the extraction stage
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub abstractions: Vec<Abstraction>,
    pub warnings: Vec<ExtractionWarning>,
}

/// Multi-language abstraction extractor that delegates to
/// language-specific parsers
pub struct AbstractionExtractor {
    config: ExtractionConfig,
    language_parsers: HashMap<String, Box<dyn LanguageParser>>,
    fallback: GenericHeuristicParser,
    branch_re: Regex,
}

impl AbstractionExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let mut language_parsers: HashMap<String, Box<dyn LanguageParser>> = HashMap::new();

        for language in &config.languages {
            match language.as_str() {
                "rust" => {
                    language_parsers.insert("rust".to_string(), Box::new(RustParser::new()?));
                }
                "python" => {
                    language_parsers.insert("python".to_string(), Box::new(PythonParser::new()?));
                }
                "javascript" => {
                    language_parsers
                        .insert("javascript".to_string(), Box::new(JavaScriptParser::new()?));
                }
                // Anything else falls through to the heuristic parser
                _ => continue,
            }
        }

        let branch_re =
            Regex::new(r"\b(if|elif|else|for|while|loop|match|switch|case|catch|except|when)\b")
                .map_err(|e| TutorError::Parser(e.to_string()))?;

        Ok(Self {
            config: config.clone(),
            language_parsers,
            fallback: GenericHeuristicParser::new()?,
            branch_re,
        })
    }

    /// Extract the abstraction set from the full file list.
    ///
    /// Single-file parse failures become warnings; the fatal
    /// [`TutorError::NothingToTeach`] is raised only when nothing at all
    /// survives filtering.
    pub fn extract(&mut self, files: &[SourceFile]) -> Result<ExtractionOutcome> {
        let mut abstractions = Vec::new();
        let mut warnings = Vec::new();
        let mut seen_ids = HashSet::new();

        for file in files {
            if file.language == "unknown" {
                continue;
            }
            if file.content.len() > self.config.max_file_size {
                continue;
            }

            let parsed = match self.parse_file(file) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Skipping {}: {}", file.path.display(), e);
                    warnings.push(ExtractionWarning {
                        file: file.path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for declaration in &parsed.declarations {
                let abstraction = self.build_abstraction(file, declaration, &parsed);
                if seen_ids.insert(abstraction.id.clone()) {
                    abstractions.push(abstraction);
                } else {
                    warnings.push(ExtractionWarning {
                        file: file.path.clone(),
                        reason: format!("duplicate declaration '{}' skipped", declaration.name),
                    });
                }
            }
        }

        debug!("Extracted {} raw abstractions", abstractions.len());

        // Uniform minimum-complexity filter
        let min = self.config.min_complexity;
        abstractions.retain(|a| a.complexity >= min);

        // Cap output by discarding the lowest-complexity abstractions
        if abstractions.len() > self.config.max_abstractions {
            abstractions.sort_by(|a, b| {
                b.complexity.cmp(&a.complexity).then_with(|| a.id.cmp(&b.id))
            });
            abstractions.truncate(self.config.max_abstractions);
        }

        // Stable presentation order regardless of how the cap reshuffled
        abstractions.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then_with(|| a.line.cmp(&b.line))
                .then_with(|| a.name.cmp(&b.name))
        });

        if abstractions.is_empty() {
            return Err(TutorError::NothingToTeach);
        }

        Ok(ExtractionOutcome {
            abstractions,
            warnings,
        })
    }

    fn parse_file(&mut self, file: &SourceFile) -> Result<ParsedSource> {
        // NUL bytes mean binary content that slipped past detection; the
        // grammar-based parsers would silently produce garbage for it
        if file.content.contains('\u{0}') {
            return Err(TutorError::Parser("content contains binary data".to_string()));
        }

        match self.language_parsers.get_mut(&file.language) {
            Some(parser) => parser.parse(&file.content),
            None => self.fallback.parse(&file.content),
        }
    }

    fn build_abstraction(
        &self,
        file: &SourceFile,
        declaration: &RawDeclaration,
        parsed: &ParsedSource,
    ) -> Abstraction {
        let complexity = self.complexity_score(declaration, parsed.imports.len());

        Abstraction {
            id: stable_id(&file.path, &declaration.name, declaration.start_line),
            name: declaration.name.clone(),
            kind: AbstractionKind::from_raw(&declaration.kind),
            file: file.path.clone(),
            line: declaration.start_line,
            module: module_name(&file.path),
            language: file.language.clone(),
            doc: declaration.doc.clone(),
            members: declaration.members.clone(),
            imports: parsed.imports.clone(),
            supertypes: declaration.supertypes.clone(),
            complexity,
            body: declaration.body.clone(),
        }
    }

    /// Deterministic complexity score in 1..=10.
    ///
    /// score = 1 + lines/40 + branches/4 + members/3 + fan_out/4, clamped,
    /// where fan_out counts imports plus supertypes. Integer arithmetic
    /// throughout so re-runs can never drift.
    fn complexity_score(&self, declaration: &RawDeclaration, import_count: usize) -> u8 {
        let lines = declaration
            .end_line
            .saturating_sub(declaration.start_line)
            + 1;
        let branches = self.branch_re.find_iter(&declaration.body).count();
        let members = declaration.members.len();
        let fan_out = import_count + declaration.supertypes.len();

        let score = 1 + lines / 40 + branches / 4 + members / 3 + fan_out / 4;
        score.clamp(1, 10) as u8
    }
}

/// First 12 hex chars of sha256(path :: name :: line); stable across
/// re-runs on unchanged input
fn stable_id(path: &Path, name: &str, line: usize) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"::");
    hasher.update(name.as_bytes());
    hasher.update(b"::");
    hasher.update(line.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

/// Declaring module name for import matching
fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}
