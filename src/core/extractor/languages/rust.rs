use std::collections::HashMap;

use tree_sitter::{Node, Parser};

use super::{LanguageParser, ParsedSource, RawDeclaration};
use crate::error::{Result, TutorError};

/// Rust-specific parser using Tree-sitter
pub struct RustParser {
    parser: Parser,
}

impl RustParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let rust_language = tree_sitter_rust::language();
        parser
            .set_language(&rust_language)
            .map_err(|e| TutorError::Parser(format!("Failed to set Rust language: {}", e)))?;

        Ok(Self { parser })
    }
}

impl LanguageParser for RustParser {
    fn parse(&mut self, content: &str) -> Result<ParsedSource> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| TutorError::Parser("Failed to parse Rust code".to_string()))?;

        let root_node = tree.root_node();
        let mut parsed = ParsedSource::default();
        let mut impl_members: HashMap<String, Vec<String>> = HashMap::new();
        let mut impl_traits: HashMap<String, Vec<String>> = HashMap::new();

        let mut cursor = root_node.walk();
        for child in root_node.children(&mut cursor) {
            match child.kind() {
                "function_item" => {
                    if let Some(decl) = self.parse_named_item(child, content, "function") {
                        parsed.declarations.push(decl);
                    }
                }
                "struct_item" | "enum_item" => {
                    if let Some(mut decl) = self.parse_named_item(child, content, "class") {
                        decl.members = self.extract_type_members(child, content);
                        parsed.declarations.push(decl);
                    }
                }
                "trait_item" => {
                    if let Some(mut decl) = self.parse_named_item(child, content, "interface") {
                        decl.members = self.extract_function_names(child, content);
                        parsed.declarations.push(decl);
                    }
                }
                "mod_item" => {
                    if let Some(decl) = self.parse_named_item(child, content, "module") {
                        parsed.declarations.push(decl);
                    }
                }
                "impl_item" => {
                    self.record_impl_block(child, content, &mut impl_members, &mut impl_traits);
                }
                "use_declaration" => {
                    parsed
                        .imports
                        .extend(self.extract_use_segments(child, content));
                }
                _ => {}
            }
        }

        // Fold impl blocks back into the type declarations they extend
        for decl in &mut parsed.declarations {
            if let Some(methods) = impl_members.remove(&decl.name) {
                decl.members.extend(methods);
            }
            if let Some(traits) = impl_traits.remove(&decl.name) {
                decl.supertypes.extend(traits);
            }
        }

        parsed.imports.sort();
        parsed.imports.dedup();
        Ok(parsed)
    }

    fn language_name(&self) -> &str {
        "rust"
    }
}

impl RustParser {
    /// Parse any item carrying a `name` field into a declaration
    fn parse_named_item(&self, node: Node, source: &str, kind: &str) -> Option<RawDeclaration> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.node_text(name_node, source);

        Some(RawDeclaration {
            name,
            kind: kind.to_string(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            doc: self.extract_doc_comment(node, source),
            members: vec![],
            supertypes: vec![],
            body: self.node_text(node, source),
        })
    }

    /// Field and variant names of a struct or enum
    fn extract_type_members(&self, node: Node, source: &str) -> Vec<String> {
        let mut members = Vec::new();
        let Some(body) = node.child_by_field_name("body") else {
            return members;
        };

        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            match child.kind() {
                "field_declaration" | "enum_variant" => {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        members.push(self.node_text(name_node, source));
                    }
                }
                _ => {}
            }
        }
        members
    }

    /// Function names declared inside a trait or impl body
    fn extract_function_names(&self, node: Node, source: &str) -> Vec<String> {
        let mut names = Vec::new();
        let Some(body) = node.child_by_field_name("body") else {
            return names;
        };

        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            if matches!(child.kind(), "function_item" | "function_signature_item") {
                if let Some(name_node) = child.child_by_field_name("name") {
                    names.push(self.node_text(name_node, source));
                }
            }
        }
        names
    }

    /// Record methods and implemented traits of an impl block, keyed by
    /// the type name so they can be merged into its declaration
    fn record_impl_block(
        &self,
        node: Node,
        source: &str,
        impl_members: &mut HashMap<String, Vec<String>>,
        impl_traits: &mut HashMap<String, Vec<String>>,
    ) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        let type_name = base_type_name(&self.node_text(type_node, source));

        let methods = self.extract_function_names(node, source);
        if !methods.is_empty() {
            impl_members.entry(type_name.clone()).or_default().extend(methods);
        }

        if let Some(trait_node) = node.child_by_field_name("trait") {
            let trait_name = base_type_name(&self.node_text(trait_node, source));
            impl_traits.entry(type_name).or_default().push(trait_name);
        }
    }

    /// Candidate module names out of a `use` declaration
    fn extract_use_segments(&self, node: Node, source: &str) -> Vec<String> {
        let text = self.node_text(node, source);
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|segment| !segment.is_empty())
            .filter(|segment| {
                !matches!(*segment, "use" | "pub" | "as" | "crate" | "self" | "super" | "std")
            })
            .map(|segment| segment.to_string())
            .collect()
    }

    /// Collect the `///` comment block immediately preceding an item
    fn extract_doc_comment(&self, node: Node, source: &str) -> Option<String> {
        let mut lines = Vec::new();
        let mut current = node.prev_sibling();

        while let Some(sibling) = current {
            if sibling.kind() != "line_comment" {
                break;
            }
            let text = self.node_text(sibling, source);
            let Some(stripped) = text
                .strip_prefix("///")
                .or_else(|| text.strip_prefix("//!"))
            else {
                break;
            };
            lines.push(stripped.trim().to_string());
            current = sibling.prev_sibling();
        }

        if lines.is_empty() {
            None
        } else {
            lines.reverse();
            Some(lines.join(" "))
        }
    }

    /// Extract text content of a node
    fn node_text(&self, node: Node, source: &str) -> String {
        source[node.byte_range()].to_string()
    }
}

/// Strip generics and references off a type expression
fn base_type_name(raw: &str) -> String {
    raw.trim_start_matches('&')
        .split(['<', ' '])
        .next()
        .unwrap_or(raw)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_structs_functions_and_impl_methods() {
        let source = r#"
use crate::planner::Chapter;

/// Tracks one run of the pipeline.
pub struct RunState {
    started: bool,
    steps: u32,
}

impl RunState {
    pub fn advance(&mut self) {
        self.steps += 1;
    }
}

pub fn reset(state: &mut RunState) {
    state.steps = 0;
}
"#;

        let mut parser = RustParser::new().unwrap();
        let parsed = parser.parse(source).unwrap();

        let run_state = parsed
            .declarations
            .iter()
            .find(|d| d.name == "RunState")
            .unwrap();
        assert_eq!(run_state.kind, "class");
        assert!(run_state.members.contains(&"started".to_string()));
        assert!(run_state.members.contains(&"advance".to_string()));
        assert_eq!(run_state.doc.as_deref(), Some("Tracks one run of the pipeline."));

        assert!(parsed.declarations.iter().any(|d| d.name == "reset"));
        assert!(parsed.imports.contains(&"planner".to_string()));
    }

    #[test]
    fn trait_impl_becomes_a_supertype() {
        let source = r#"
pub trait Renderer {
    fn render(&self) -> String;
}

pub struct Markdown;

impl Renderer for Markdown {
    fn render(&self) -> String {
        String::new()
    }
}
"#;

        let mut parser = RustParser::new().unwrap();
        let parsed = parser.parse(source).unwrap();

        let markdown = parsed
            .declarations
            .iter()
            .find(|d| d.name == "Markdown")
            .unwrap();
        assert_eq!(markdown.supertypes, vec!["Renderer".to_string()]);

        let renderer = parsed
            .declarations
            .iter()
            .find(|d| d.name == "Renderer")
            .unwrap();
        assert_eq!(renderer.kind, "interface");
        assert_eq!(renderer.members, vec!["render".to_string()]);
    }
}
