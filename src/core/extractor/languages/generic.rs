use regex::Regex;

use super::{LanguageParser, ParsedSource, RawDeclaration};
use crate::error::{Result, TutorError};

/// Token-pattern fallback parser for languages without a dedicated
/// Tree-sitter grammar.
///
/// Finds declaration-looking lines with regexes and assigns each
/// declaration a body running to the next declaration at the same or
/// shallower indentation. Deliberately best-effort.
pub struct GenericHeuristicParser {
    function_re: Regex,
    type_re: Regex,
    import_re: Regex,
}

impl GenericHeuristicParser {
    pub fn new() -> Result<Self> {
        let function_re = Regex::new(
            r"^(\s*)(?:pub\s+|public\s+|private\s+|static\s+|async\s+|export\s+)*(?:function|fn|def|func|sub)\s+([A-Za-z_][A-Za-z0-9_]*)",
        )
        .map_err(|e| TutorError::Parser(e.to_string()))?;

        let type_re = Regex::new(
            r"^(\s*)(?:pub\s+|public\s+|abstract\s+|export\s+)*(class|interface|struct|trait|enum|module)\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*(?:extends|implements|:)\s*([A-Za-z0-9_,.\s]+))?",
        )
        .map_err(|e| TutorError::Parser(e.to_string()))?;

        let import_re = Regex::new(
            r#"^\s*(?:import|from|use|require|include|#include)\b\s*[<"']?([A-Za-z0-9_./-]+)"#,
        )
        .map_err(|e| TutorError::Parser(e.to_string()))?;

        Ok(Self {
            function_re,
            type_re,
            import_re,
        })
    }

    /// Index of the line ending the block that starts at `start`
    fn block_end(&self, lines: &[&str], start: usize, indent: usize) -> usize {
        let mut end = start;
        for (offset, line) in lines.iter().enumerate().skip(start + 1) {
            let trimmed = line.trim_start();
            if trimmed.is_empty() {
                continue;
            }
            let line_indent = line.len() - trimmed.len();
            if line_indent <= indent && self.is_declaration_line(line) {
                break;
            }
            end = offset;
        }
        end
    }

    fn is_declaration_line(&self, line: &str) -> bool {
        self.function_re.is_match(line) || self.type_re.is_match(line)
    }
}

impl LanguageParser for GenericHeuristicParser {
    fn parse(&mut self, content: &str) -> Result<ParsedSource> {
        let lines: Vec<&str> = content.lines().collect();
        let mut parsed = ParsedSource::default();

        for (index, line) in lines.iter().enumerate() {
            if let Some(caps) = self.import_re.captures(line) {
                let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let basename = raw.rsplit('/').next().unwrap_or(raw);
                let module = basename.split('.').next().unwrap_or(basename);
                if !module.is_empty() {
                    parsed.imports.push(module.to_string());
                }
                continue;
            }

            if let Some(caps) = self.type_re.captures(line) {
                let indent = caps.get(1).map_or(0, |m| m.as_str().len());
                let keyword = caps.get(2).map(|m| m.as_str()).unwrap_or("class");
                let name = caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default();
                let supertypes = caps
                    .get(4)
                    .map(|m| {
                        m.as_str()
                            .split(',')
                            .map(|s| s.trim().rsplit('.').next().unwrap_or("").to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();

                let end = self.block_end(&lines, index, indent);
                let body: String = lines[index..=end].join("\n");

                // Nested function-like lines become members
                let members = lines[index + 1..=end]
                    .iter()
                    .filter_map(|l| self.function_re.captures(l))
                    .filter_map(|c| c.get(2).map(|m| m.as_str().to_string()))
                    .collect();

                let kind = match keyword {
                    "interface" | "trait" => "interface",
                    "module" => "module",
                    _ => "class",
                };

                parsed.declarations.push(RawDeclaration {
                    name,
                    kind: kind.to_string(),
                    start_line: index + 1,
                    end_line: end + 1,
                    doc: None,
                    members,
                    supertypes,
                    body,
                });
            } else if let Some(caps) = self.function_re.captures(line) {
                let indent = caps.get(1).map_or(0, |m| m.as_str().len());

                // Indented functions are already captured as members of
                // their enclosing type
                if indent > 0 {
                    continue;
                }

                let name = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
                let end = self.block_end(&lines, index, indent);

                parsed.declarations.push(RawDeclaration {
                    name,
                    kind: "function".to_string(),
                    start_line: index + 1,
                    end_line: end + 1,
                    doc: None,
                    members: vec![],
                    supertypes: vec![],
                    body: lines[index..=end].join("\n"),
                });
            }
        }

        parsed.imports.sort();
        parsed.imports.dedup();
        Ok(parsed)
    }

    fn language_name(&self) -> &str {
        "generic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_declarations_in_an_unsupported_language() {
        let source = r#"
import utils/logger

class Session extends Base
    func start()
        log("starting")

    func stop()
        log("stopping")

func main()
    session = Session()
    session.start()
"#;

        let mut parser = GenericHeuristicParser::new().unwrap();
        let parsed = parser.parse(source).unwrap();

        let session = parsed
            .declarations
            .iter()
            .find(|d| d.name == "Session")
            .unwrap();
        assert_eq!(session.kind, "class");
        assert_eq!(session.supertypes, vec!["Base".to_string()]);
        assert_eq!(session.members, vec!["start".to_string(), "stop".to_string()]);

        assert!(parsed.declarations.iter().any(|d| d.name == "main"));
        assert_eq!(parsed.imports, vec!["logger".to_string()]);
    }
}
