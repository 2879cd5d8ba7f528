use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TutorError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project-level settings
    pub project: ProjectConfig,

    /// Abstraction extraction settings
    pub extraction: ExtractionConfig,

    /// Relationship analysis settings
    pub analysis: AnalysisConfig,

    /// Learning-path planning settings
    pub planning: PlanningConfig,

    /// Chapter content generation settings
    pub generation: GenerationConfig,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name; defaults to the source directory name when empty
    pub name: Option<String>,

    /// Directories to ignore beyond .gitignore
    pub ignore_patterns: Vec<String>,

    /// Whether to respect .gitignore when walking the source tree
    pub respect_gitignore: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Languages to extract abstractions from
    pub languages: Vec<String>,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,

    /// Minimum complexity score (1-10) an abstraction must reach to be kept
    pub min_complexity: u8,

    /// Cap on extracted abstractions; lowest-complexity ones beyond the
    /// cap are discarded
    pub max_abstractions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Relationships below this strength are discarded
    pub min_relationship_strength: f64,

    /// Edges at or above this strength count as "strong" for clustering
    pub strong_cluster_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// Maximum number of abstractions per chapter
    pub max_chapter_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Width of the concurrent map-phase worker pool
    pub map_concurrency: usize,

    /// Maximum attempts per content request (first try + retries)
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff between retries
    pub retry_base_delay_ms: u64,

    /// Global timeout for the whole map phase, in seconds
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider (openai, anthropic)
    pub provider: String,

    /// Model name (e.g. "gpt-4o", "claude-sonnet-4-5")
    pub model: String,

    /// API key; falls back to CODETUTOR_API_KEY when unset
    pub api_key: Option<String>,

    /// Base URL override for OpenAI-compatible endpoints
    pub base_url: Option<String>,

    /// Maximum tokens for LLM responses
    pub max_tokens: Option<u32>,

    /// Temperature for LLM responses (0.0 to 1.0)
    pub temperature: Option<f32>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Tutorial output directory
    pub dir: PathBuf,

    /// Include a generated-at stamp in the index header
    pub include_metadata: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                name: None,
                ignore_patterns: vec![
                    "target/".to_string(),
                    "node_modules/".to_string(),
                    ".git/".to_string(),
                ],
                respect_gitignore: true,
            },
            extraction: ExtractionConfig {
                languages: vec![
                    "rust".to_string(),
                    "python".to_string(),
                    "javascript".to_string(),
                ],
                max_file_size: 1024 * 1024, // 1MB
                min_complexity: 2,
                max_abstractions: 100,
            },
            analysis: AnalysisConfig {
                min_relationship_strength: 0.1,
                strong_cluster_threshold: 0.7,
            },
            planning: PlanningConfig {
                max_chapter_size: 6,
            },
            generation: GenerationConfig {
                map_concurrency: 4,
                max_retries: 3,
                retry_base_delay_ms: 500,
                run_timeout_secs: 600,
            },
            llm: LlmConfig {
                provider: "openai".to_string(),
                model: "gpt-4o".to_string(),
                api_key: None,
                base_url: None,
                max_tokens: Some(2000),
                temperature: Some(0.3),
                request_timeout_secs: 60,
            },
            output: OutputConfig {
                dir: PathBuf::from("tutorial"),
                include_metadata: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| TutorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| TutorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = ["Codetutor.toml", "codetutor.toml", ".codetutor.toml"];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    /// Reject option values the pipeline cannot honor
    fn validate(&self) -> Result<()> {
        if self.extraction.min_complexity < 1 || self.extraction.min_complexity > 10 {
            return Err(TutorError::Config(
                "extraction.min_complexity must be between 1 and 10".to_string(),
            ));
        }
        if self.extraction.max_abstractions == 0 {
            return Err(TutorError::Config(
                "extraction.max_abstractions must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.min_relationship_strength) {
            return Err(TutorError::Config(
                "analysis.min_relationship_strength must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.strong_cluster_threshold) {
            return Err(TutorError::Config(
                "analysis.strong_cluster_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.planning.max_chapter_size == 0 {
            return Err(TutorError::Config(
                "planning.max_chapter_size must be at least 1".to_string(),
            ));
        }
        if self.generation.map_concurrency == 0 {
            return Err(TutorError::Config(
                "generation.map_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
