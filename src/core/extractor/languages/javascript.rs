use tree_sitter::{Node, Parser};

use super::{LanguageParser, ParsedSource, RawDeclaration};
use crate::error::{Result, TutorError};

/// JavaScript-specific parser using Tree-sitter
pub struct JavaScriptParser {
    parser: Parser,
}

impl JavaScriptParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let javascript_language = tree_sitter_javascript::language();
        parser.set_language(&javascript_language).map_err(|e| {
            TutorError::Parser(format!("Failed to set JavaScript language: {}", e))
        })?;

        Ok(Self { parser })
    }
}

impl LanguageParser for JavaScriptParser {
    fn parse(&mut self, content: &str) -> Result<ParsedSource> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| TutorError::Parser("Failed to parse JavaScript code".to_string()))?;

        let root_node = tree.root_node();
        let mut parsed = ParsedSource::default();
        self.extract_items(root_node, content, &mut parsed);

        parsed.imports.sort();
        parsed.imports.dedup();
        Ok(parsed)
    }

    fn language_name(&self) -> &str {
        "javascript"
    }
}

impl JavaScriptParser {
    fn extract_items(&self, node: Node, source: &str, parsed: &mut ParsedSource) {
        let mut cursor = node.walk();

        for child in node.children(&mut cursor) {
            match child.kind() {
                "class_declaration" => {
                    if let Some(decl) = self.parse_class(child, source) {
                        parsed.declarations.push(decl);
                    }
                }
                "function_declaration" | "generator_function_declaration" => {
                    if let Some(decl) = self.parse_function(child, source) {
                        parsed.declarations.push(decl);
                    }
                }
                "import_statement" => {
                    if let Some(name) = self.extract_import_module(child, source) {
                        parsed.imports.push(name);
                    }
                }
                _ => {
                    // export statements and the like wrap declarations
                    self.extract_items(child, source, parsed);
                }
            }
        }
    }

    /// Parse a class declaration, including its extends clause and methods
    fn parse_class(&self, node: Node, source: &str) -> Option<RawDeclaration> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.node_text(name_node, source);

        let mut supertypes = Vec::new();
        let mut heritage_cursor = node.walk();
        for child in node.children(&mut heritage_cursor) {
            if child.kind() == "class_heritage" {
                let mut cursor = child.walk();
                for base in child.children(&mut cursor) {
                    if matches!(base.kind(), "identifier" | "member_expression") {
                        let base_name = self.node_text(base, source);
                        let leaf = base_name.rsplit('.').next().unwrap_or(&base_name);
                        supertypes.push(leaf.to_string());
                    }
                }
            }
        }

        let mut members = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.children(&mut cursor) {
                if matches!(child.kind(), "method_definition" | "field_definition") {
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
            doc: None,
            members,
            supertypes,
            body: self.node_text(node, source),
        })
    }

    fn parse_function(&self, node: Node, source: &str) -> Option<RawDeclaration> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.node_text(name_node, source);

        Some(RawDeclaration {
            name,
            kind: "function".to_string(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            doc: None,
            members: vec![],
            supertypes: vec![],
            body: self.node_text(node, source),
        })
    }

    /// Module name from the import source string, without path or extension
    fn extract_import_module(&self, node: Node, source: &str) -> Option<String> {
        let source_node = node.child_by_field_name("source")?;
        let raw = self.node_text(source_node, source);
        let trimmed = raw.trim_matches(['"', '\'', '`']);
        let basename = trimmed.rsplit('/').next().unwrap_or(trimmed);
        let module = basename.trim_end_matches(".js").trim_end_matches(".mjs");

        if module.is_empty() {
            None
        } else {
            Some(module.to_string())
        }
    }

    /// Extract text content of a node
    fn node_text(&self, node: Node, source: &str) -> String {
        source[node.byte_range()].to_string()
    }
}
