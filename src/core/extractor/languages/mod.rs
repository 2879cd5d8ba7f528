//! Language-specific structural parsers
//!
//! Each supported language gets its own module behind one capability
//! interface. The extractor selects a parser by detected-language tag and
//! falls back to the token-pattern heuristic parser for everything else;
//! adding a language means adding a variant here, not touching the
//! extractor's control flow.

mod generic;
mod javascript;
mod python;
mod rust;

pub use generic::GenericHeuristicParser;
pub use javascript::JavaScriptParser;
pub use python::PythonParser;
pub use rust::RustParser;

use crate::error::Result;

/// One located declaration, before it becomes an [`Abstraction`]
///
/// [`Abstraction`]: super::Abstraction
#[derive(Debug, Clone, Default)]
pub struct RawDeclaration {
    /// Declared name
    pub name: String,

    /// Language-level construct kind ("class", "function", "module", ...)
    pub kind: String,

    /// 1-based starting line
    pub start_line: usize,

    /// 1-based ending line
    pub end_line: usize,

    /// Attached documentation text, if any
    pub doc: Option<String>,

    /// Declared member names (methods, fields), in source order
    pub members: Vec<String>,

    /// Declared supertype / interface names, in source order
    pub supertypes: Vec<String>,

    /// Source text of the declaration body, used for reference scanning
    /// and branch counting
    pub body: String,
}

/// Result of structurally parsing one source file
#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    /// Declarations found in the file, in source order
    pub declarations: Vec<RawDeclaration>,

    /// Module names referenced by the file's import statements
    pub imports: Vec<String>,
}

/// Trait that all language parsers must implement
pub trait LanguageParser {
    /// Parse source code and extract structured declarations
    fn parse(&mut self, content: &str) -> Result<ParsedSource>;

    /// Get the language name
    fn language_name(&self) -> &str;
}
