use std::collections::HashMap;

use crate::core::analyzer::DependencyGraph;
use crate::core::extractor::Abstraction;
use crate::core::source::ProjectMetadata;

/// Build the per-abstraction content request prompt.
///
/// Carries the abstraction's own metadata, its direct graph neighborhood
/// for "relationships explained" context, and its position in the overall
/// learning path. Neighbors are rendered by display name and kind; the
/// internal identifiers mean nothing to the model.
pub fn build_section_prompt(
    abstraction: &Abstraction,
    graph: &DependencyGraph,
    by_id: &HashMap<&str, &Abstraction>,
    position: usize,
    total: usize,
    project: &ProjectMetadata,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are writing one section of a beginner-friendly tutorial about the '{}' codebase \
        (primary language: {}). Explain the following code abstraction so a newcomer \
        understands what it is for and how it fits into the system.\n\n",
        project.name, project.primary_language
    ));

    prompt.push_str(&format!(
        "ABSTRACTION:\n\
        Name: {}\n\
        Kind: {}\n\
        Defined in: {} (line {})\n\
        Complexity: {}/10\n",
        abstraction.name,
        abstraction.kind.label(),
        abstraction.file.display(),
        abstraction.line,
        abstraction.complexity
    ));

    if let Some(doc) = &abstraction.doc {
        prompt.push_str(&format!("Existing documentation: {}\n", doc));
    }

    if !abstraction.members.is_empty() {
        prompt.push_str(&format!("Members: {}\n", abstraction.members.join(", ")));
    }

    let neighbors = graph.neighbors(&abstraction.id);
    if !neighbors.is_empty() {
        prompt.push_str("\nRELATIONSHIPS:\n");
        for edge in neighbors.iter().take(8) {
            let (other_id, direction) = if edge.source == abstraction.id {
                (edge.target.as_str(), "this")
            } else {
                (edge.source.as_str(), "the other")
            };
            let other = match by_id.get(other_id) {
                Some(other) => format!("the {} {}", other.kind.label(), other.name),
                None => format!("the abstraction {}", other_id),
            };
            prompt.push_str(&format!(
                "- {} {} {} (strength {:.2})\n",
                direction,
                edge.kind.label(),
                other,
                edge.strength
            ));
        }
    }

    prompt.push_str(&format!(
        "\nPOSITION: section {} of {} in the learning path; earlier sections are already \
        explained, later ones are not, so only reference concepts that come before.\n\n\
        Write 2-4 short paragraphs of plain prose. No headings, no code fences, no \
        bullet lists. Start from the abstraction's purpose, then how it collaborates \
        with its relationships.",
        position + 1,
        total
    ));

    prompt
}
