use tree_sitter::{Node, Parser};

use super::{LanguageParser, ParsedSource, RawDeclaration};
use crate::error::{Result, TutorError};

/// Python-specific parser using Tree-sitter
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let python_language = tree_sitter_python::language();
        parser
            .set_language(&python_language)
            .map_err(|e| TutorError::Parser(format!("Failed to set Python language: {}", e)))?;

        Ok(Self { parser })
    }
}

impl LanguageParser for PythonParser {
    fn parse(&mut self, content: &str) -> Result<ParsedSource> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| TutorError::Parser("Failed to parse Python code".to_string()))?;

        let root_node = tree.root_node();
        let mut parsed = ParsedSource::default();
        self.extract_items(root_node, content, &mut parsed)?;

        parsed.imports.sort();
        parsed.imports.dedup();
        Ok(parsed)
    }

    fn language_name(&self) -> &str {
        "python"
    }
}

impl PythonParser {
    /// Walk the AST and extract classes, functions and imports
    fn extract_items(&self, node: Node, source: &str, parsed: &mut ParsedSource) -> Result<()> {
        let mut cursor = node.walk();

        for child in node.children(&mut cursor) {
            match child.kind() {
                "class_definition" => {
                    if let Some(decl) = self.parse_class(child, source) {
                        parsed.declarations.push(decl);
                    }
                }
                "function_definition" => {
                    if let Some(decl) = self.parse_function(child, source, "function") {
                        parsed.declarations.push(decl);
                    }
                }
                "import_statement" | "import_from_statement" => {
                    parsed.imports.extend(self.extract_import_names(child, source));
                }
                _ => {
                    // Recursively check child nodes (decorated definitions etc.)
                    self.extract_items(child, source, parsed)?;
                }
            }
        }

        Ok(())
    }

    /// Parse a Python class definition
    fn parse_class(&self, node: Node, source: &str) -> Option<RawDeclaration> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.node_text(name_node, source);

        // Base classes from the superclasses argument list
        let mut supertypes = Vec::new();
        if let Some(bases) = node.child_by_field_name("superclasses") {
            let mut cursor = bases.walk();
            for base in bases.children(&mut cursor) {
                if matches!(base.kind(), "identifier" | "attribute") {
                    let base_name = self.node_text(base, source);
                    let leaf = base_name.rsplit('.').next().unwrap_or(&base_name);
                    if leaf != "object" {
                        supertypes.push(leaf.to_string());
                    }
                }
            }
        }

        // Methods declared in the class body
        let mut members = Vec::new();
        if let Some(body_node) = node.child_by_field_name("body") {
            let mut cursor = body_node.walk();
            for child in body_node.children(&mut cursor) {
                if child.kind() == "function_definition" {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        members.push(self.node_text(name_node, source));
                    }
                }
            }
        }

        Some(RawDeclaration {
            name,
            kind: "class".to_string(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            doc: self.extract_docstring(node, source),
            members,
            supertypes,
            body: self.node_text(node, source),
        })
    }

    /// Parse a Python function definition
    fn parse_function(&self, node: Node, source: &str, kind: &str) -> Option<RawDeclaration> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.node_text(name_node, source);

        Some(RawDeclaration {
            name,
            kind: kind.to_string(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            doc: self.extract_docstring(node, source),
            members: vec![],
            supertypes: vec![],
            body: self.node_text(node, source),
        })
    }

    /// Module names referenced by an import statement
    fn extract_import_names(&self, node: Node, source: &str) -> Vec<String> {
        let text = self.node_text(node, source);
        let mut names = Vec::new();

        // `import a.b.c` and `from a.b import c` both reduce to their
        // dotted path segments
        for token in text.split_whitespace().skip(1) {
            if matches!(token, "import" | "as" | "from" | "*" | "(") {
                continue;
            }
            for segment in token.split(['.', ',']) {
                let segment = segment.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
                if !segment.is_empty() {
                    names.push(segment.to_string());
                }
            }
        }

        names
    }

    /// Extract docstring from a function/class body
    fn extract_docstring(&self, node: Node, source: &str) -> Option<String> {
        let body_node = node.child_by_field_name("body")?;
        let mut cursor = body_node.walk();

        for child in body_node.children(&mut cursor) {
            if child.kind() == "expression_statement" {
                let mut expr_cursor = child.walk();
                for expr_child in child.children(&mut expr_cursor) {
                    if expr_child.kind() == "string" {
                        let docstring = self.node_text(expr_child, source);
                        let cleaned = docstring
                            .trim_start_matches("\"\"\"")
                            .trim_end_matches("\"\"\"")
                            .trim_start_matches("'''")
                            .trim_end_matches("'''")
                            .trim_matches('"')
                            .trim_matches('\'')
                            .trim();
                        if !cleaned.is_empty() {
                            return Some(cleaned.to_string());
                        }
                    }
                }
                break; // Only check first statement
            }
        }
        None
    }

    /// Extract text content of a node
    fn node_text(&self, node: Node, source: &str) -> String {
        source[node.byte_range()].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_classes_with_bases_and_docstrings() {
        let source = r#"
from app.store import Store

class Repository(Store):
    """Persists tutorial runs."""

    def save(self, run):
        pass

    def load(self, run_id):
        pass

def helper():
    return 1
"#;

        let mut parser = PythonParser::new().unwrap();
        let parsed = parser.parse(source).unwrap();

        let repo = parsed
            .declarations
            .iter()
            .find(|d| d.name == "Repository")
            .unwrap();
        assert_eq!(repo.kind, "class");
        assert_eq!(repo.supertypes, vec!["Store".to_string()]);
        assert_eq!(repo.members, vec!["save".to_string(), "load".to_string()]);
        assert_eq!(repo.doc.as_deref(), Some("Persists tutorial runs."));

        assert!(parsed.declarations.iter().any(|d| d.name == "helper"));
        assert!(parsed.imports.contains(&"store".to_string()));
    }
}
