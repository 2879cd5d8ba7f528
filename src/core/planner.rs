//! Learning-path planning
//!
//! Orders abstractions so static dependencies are taught before their
//! dependents, then partitions the order into chapters. Output is fully
//! deterministic: identical abstraction and relationship input yields a
//! byte-identical plan.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PlanningConfig;
use crate::error::{Result, TutorError};

use super::analyzer::DependencyGraph;
use super::extractor::Abstraction;

/// Declared difficulty tier of a chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// Bucket a mean member complexity into a tier
    fn from_mean_complexity(mean: f64) -> Self {
        if mean < 4.0 {
            Self::Beginner
        } else if mean < 7.0 {
            Self::Intermediate
        } else {
            Self::Advanced
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

/// One teaching unit of the plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// 0-based, contiguous order index
    pub index: usize,

    /// Chapter title
    pub title: String,

    /// Member abstraction identifiers, in teaching order
    pub members: Vec<String>,

    /// Difficulty tier from mean member complexity
    pub difficulty: Difficulty,

    /// Indices of earlier chapters containing direct predecessors of any
    /// member; always strictly less than `index`
    pub prerequisites: Vec<usize>,
}

/// The ordered partition of abstractions into chapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterPlan {
    pub chapters: Vec<Chapter>,
}

impl ChapterPlan {
    /// Validate the plan's own invariants before handoff.
    ///
    /// Violations here indicate a planner bug, never bad input, so they
    /// are fatal.
    pub fn validate(&self, abstractions: &[Abstraction]) -> Result<()> {
        let mut covered = HashSet::new();
        for chapter in &self.chapters {
            for member in &chapter.members {
                if !covered.insert(member.clone()) {
                    return Err(TutorError::invariant(
                        "planner",
                        format!("abstraction {} appears in more than one chapter", member),
                    ));
                }
            }
            for prerequisite in &chapter.prerequisites {
                if *prerequisite >= chapter.index {
                    return Err(TutorError::invariant(
                        "planner",
                        format!(
                            "chapter {} lists non-earlier prerequisite {}",
                            chapter.index, prerequisite
                        ),
                    ));
                }
            }
        }

        for (expected, chapter) in self.chapters.iter().enumerate() {
            if chapter.index != expected {
                return Err(TutorError::invariant(
                    "planner",
                    format!(
                        "chapter order indices are not contiguous: expected {}, found {}",
                        expected, chapter.index
                    ),
                ));
            }
        }

        for abstraction in abstractions {
            if !covered.contains(&abstraction.id) {
                return Err(TutorError::invariant(
                    "planner",
                    format!("abstraction {} is missing from all chapters", abstraction.id),
                ));
            }
        }
        if covered.len() != abstractions.len() {
            return Err(TutorError::invariant(
                "planner",
                "chapters cover identifiers outside the abstraction set".to_string(),
            ));
        }

        Ok(())
    }

    /// Chapter index containing the given abstraction
    pub fn chapter_of(&self, id: &str) -> Option<usize> {
        self.chapters
            .iter()
            .find(|c| c.members.iter().any(|m| m == id))
            .map(|c| c.index)
    }
}

/// Plans the chapter sequence from the dependency graph
pub struct LearningPathPlanner {
    config: PlanningConfig,
}

impl LearningPathPlanner {
    pub fn new(config: &PlanningConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn plan(
        &self,
        abstractions: &[Abstraction],
        graph: &DependencyGraph,
    ) -> Result<ChapterPlan> {
        let order = self.topological_order(abstractions, graph);
        let chapters = self.group_into_chapters(&order, abstractions, graph);

        let plan = ChapterPlan { chapters };
        plan.validate(abstractions)?;

        debug!(
            "Planned {} chapters over {} abstractions",
            plan.chapters.len(),
            abstractions.len()
        );
        Ok(plan)
    }

    /// Kahn's algorithm over the acyclic ordering edges.
    ///
    /// The ready set is a min-heap keyed by (complexity, id), so
    /// unconstrained abstractions surface simplest-first and ties resolve
    /// identically on every run. Leftover nodes mean the analyzer let a
    /// cycle through; they are appended in the same keyed order rather
    /// than failing the run.
    fn topological_order(
        &self,
        abstractions: &[Abstraction],
        graph: &DependencyGraph,
    ) -> Vec<String> {
        let by_id: BTreeMap<&str, &Abstraction> =
            abstractions.iter().map(|a| (a.id.as_str(), a)).collect();

        let mut in_degree: BTreeMap<&str, usize> =
            abstractions.iter().map(|a| (a.id.as_str(), 0)).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        // An ordering edge source -> target means source depends on
        // target, so the target must be taught first.
        for (source, target) in &graph.ordering_edges {
            if !by_id.contains_key(source.as_str()) || !by_id.contains_key(target.as_str()) {
                continue;
            }
            *in_degree.get_mut(source.as_str()).unwrap() += 1;
            dependents
                .entry(target.as_str())
                .or_default()
                .push(source.as_str());
        }

        let sort_key = |id: &str| {
            let complexity = by_id.get(id).map(|a| a.complexity).unwrap_or(u8::MAX);
            (complexity, id.to_string())
        };

        let mut ready: BinaryHeap<Reverse<(u8, String)>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| Reverse(sort_key(id)))
            .collect();

        let mut order = Vec::with_capacity(abstractions.len());
        let mut placed = HashSet::new();

        while let Some(Reverse((_, id))) = ready.pop() {
            placed.insert(id.clone());
            if let Some(waiting) = dependents.get(id.as_str()) {
                for dependent in waiting.clone() {
                    let degree = in_degree.get_mut(dependent).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(sort_key(dependent)));
                    }
                }
            }
            order.push(id);
        }

        if order.len() < abstractions.len() {
            warn!(
                "{} abstractions remain in an ordering cycle; appending deterministically",
                abstractions.len() - order.len()
            );
            let mut leftover: Vec<&Abstraction> = abstractions
                .iter()
                .filter(|a| !placed.contains(&a.id))
                .collect();
            leftover.sort_by(|a, b| {
                a.complexity
                    .cmp(&b.complexity)
                    .then_with(|| a.id.cmp(&b.id))
            });
            order.extend(leftover.into_iter().map(|a| a.id.clone()));
        }

        order
    }

    /// Walk the topological order, closing a chapter at the size cap or at
    /// a cluster boundary
    fn group_into_chapters(
        &self,
        order: &[String],
        abstractions: &[Abstraction],
        graph: &DependencyGraph,
    ) -> Vec<Chapter> {
        let by_id: HashMap<&str, &Abstraction> =
            abstractions.iter().map(|a| (a.id.as_str(), a)).collect();

        let mut groups: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = Vec::new();

        for id in order {
            if !current.is_empty() {
                let at_capacity = current.len() >= self.config.max_chapter_size;
                let crosses_cluster = match (
                    graph.clusters.get(id),
                    dominant_cluster(&current, graph),
                ) {
                    (Some(next), Some(dominant)) => *next != dominant,
                    _ => false,
                };
                if at_capacity || crosses_cluster {
                    groups.push(std::mem::take(&mut current));
                }
            }
            current.push(id.clone());
        }
        if !current.is_empty() {
            groups.push(current);
        }

        let mut chapters: Vec<Chapter> = Vec::with_capacity(groups.len());
        for (index, members) in groups.into_iter().enumerate() {
            let complexities: Vec<u8> = members
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|a| a.complexity))
                .collect();
            let mean = if complexities.is_empty() {
                0.0
            } else {
                complexities.iter().map(|c| *c as f64).sum::<f64>() / complexities.len() as f64
            };

            let title = chapter_title(&members, &by_id, graph);

            chapters.push(Chapter {
                index,
                title,
                members,
                difficulty: Difficulty::from_mean_complexity(mean),
                prerequisites: vec![],
            });
        }

        self.link_prerequisites(&mut chapters, graph);
        chapters
    }

    /// A chapter's prerequisites are the earlier chapters containing any
    /// direct predecessor (via any edge kind) of any of its members
    fn link_prerequisites(&self, chapters: &mut [Chapter], graph: &DependencyGraph) {
        let chapter_of: HashMap<String, usize> = chapters
            .iter()
            .flat_map(|c| c.members.iter().map(move |m| (m.clone(), c.index)))
            .collect();

        for chapter in chapters.iter_mut() {
            let mut prerequisites = HashSet::new();
            for member in &chapter.members {
                for predecessor in graph.direct_predecessors(member) {
                    if let Some(&other) = chapter_of.get(predecessor) {
                        if other < chapter.index {
                            prerequisites.insert(other);
                        }
                    }
                }
            }
            let mut prerequisites: Vec<usize> = prerequisites.into_iter().collect();
            prerequisites.sort_unstable();
            chapter.prerequisites = prerequisites;
        }
    }
}

/// Most frequent cluster among the given members; first-seen wins ties
fn dominant_cluster(members: &[String], graph: &DependencyGraph) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new(); // (cluster, count), insertion order
    for member in members {
        let Some(&cluster) = graph.clusters.get(member) else {
            continue;
        };
        match counts.iter_mut().find(|(c, _)| *c == cluster) {
            Some((_, count)) => *count += 1,
            None => counts.push((cluster, 1)),
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(cluster, _)| cluster)
}

/// Title a chapter after its most connected member
fn chapter_title(
    members: &[String],
    by_id: &HashMap<&str, &Abstraction>,
    graph: &DependencyGraph,
) -> String {
    let representative = members
        .iter()
        .max_by_key(|id| {
            (
                graph.neighbors(id).len(),
                Reverse(id.as_str().to_string()),
            )
        })
        .and_then(|id| by_id.get(id.as_str()))
        .or_else(|| members.first().and_then(|id| by_id.get(id.as_str())));

    match representative {
        Some(abstraction) => format!(
            "Understanding {} ({})",
            abstraction.name,
            abstraction.kind.label()
        ),
        None => "Untitled Chapter".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::analyzer::RelationshipAnalyzer;
    use crate::core::extractor::AbstractionKind;
    use std::path::PathBuf;

    fn abstraction(
        id: &str,
        name: &str,
        module: &str,
        imports: &[&str],
        complexity: u8,
    ) -> Abstraction {
        Abstraction {
            id: id.to_string(),
            name: name.to_string(),
            kind: AbstractionKind::Class,
            file: PathBuf::from(format!("{}.py", module)),
            line: 1,
            module: module.to_string(),
            language: "python".to_string(),
            doc: None,
            members: vec![],
            imports: imports.iter().map(|s| s.to_string()).collect(),
            supertypes: vec![],
            complexity,
            body: String::new(),
        }
    }

    fn plan_for(abstractions: &[Abstraction]) -> (ChapterPlan, DependencyGraph) {
        let config = Config::default();
        let graph = RelationshipAnalyzer::new(&config.analysis)
            .analyze(abstractions)
            .unwrap();
        let plan = LearningPathPlanner::new(&config.planning)
            .plan(abstractions, &graph)
            .unwrap();
        (plan, graph)
    }

    fn position(plan: &ChapterPlan, id: &str) -> (usize, usize) {
        for chapter in &plan.chapters {
            if let Some(offset) = chapter.members.iter().position(|m| m == id) {
                return (chapter.index, offset);
            }
        }
        panic!("{} not planned", id);
    }

    #[test]
    fn dependencies_are_taught_before_dependents() {
        // C imports B, B imports A
        let abstractions = vec![
            abstraction("id_a", "Alpha", "alpha", &[], 2),
            abstraction("id_b", "Beta", "beta", &["alpha"], 2),
            abstraction("id_c", "Gamma", "gamma", &["beta"], 2),
        ];

        let (plan, _) = plan_for(&abstractions);
        assert!(position(&plan, "id_a") < position(&plan, "id_b"));
        assert!(position(&plan, "id_b") < position(&plan, "id_c"));
    }

    #[test]
    fn unconstrained_ties_break_by_complexity_then_id() {
        let abstractions = vec![
            abstraction("id_z", "Zeta", "zeta", &[], 1),
            abstraction("id_m", "Mu", "mu", &[], 5),
            abstraction("id_a", "Alpha", "alpha", &[], 5),
        ];

        let (plan, _) = plan_for(&abstractions);
        assert!(position(&plan, "id_z") < position(&plan, "id_a"));
        assert!(position(&plan, "id_a") < position(&plan, "id_m"));
    }

    #[test]
    fn plans_are_byte_identical_across_runs() {
        let abstractions = vec![
            abstraction("id_a", "Alpha", "alpha", &[], 2),
            abstraction("id_b", "Beta", "beta", &["alpha"], 4),
            abstraction("id_c", "Gamma", "gamma", &["alpha", "beta"], 6),
            abstraction("id_d", "Delta", "delta", &[], 8),
        ];

        let (first, _) = plan_for(&abstractions);
        let (second, _) = plan_for(&abstractions);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn every_abstraction_lands_in_exactly_one_chapter() {
        let abstractions: Vec<Abstraction> = (0..17)
            .map(|i| {
                abstraction(
                    &format!("id_{:02}", i),
                    &format!("Item{}", i),
                    &format!("mod_{}", i),
                    &[],
                    (i % 10 + 1) as u8,
                )
            })
            .collect();

        let (plan, _) = plan_for(&abstractions);
        let mut seen = HashSet::new();
        for chapter in &plan.chapters {
            assert!(chapter.members.len() <= Config::default().planning.max_chapter_size);
            for member in &chapter.members {
                assert!(seen.insert(member.clone()));
            }
        }
        assert_eq!(seen.len(), abstractions.len());
    }

    #[test]
    fn prerequisites_always_point_backwards() {
        let abstractions: Vec<Abstraction> = (0..12u32)
            .map(|i| {
                let module = format!("mod_{}", i);
                let import = format!("mod_{}", i.saturating_sub(1));
                let imports: Vec<&str> = if i == 0 { vec![] } else { vec![import.as_str()] };
                let mut a = abstraction(
                    &format!("id_{:02}", i),
                    &format!("Item{}", i),
                    &module,
                    &imports,
                    3,
                );
                a.imports = imports.iter().map(|s| s.to_string()).collect();
                a
            })
            .collect();

        let (plan, _) = plan_for(&abstractions);
        for chapter in &plan.chapters {
            for prerequisite in &chapter.prerequisites {
                assert!(*prerequisite < chapter.index);
            }
        }
        // A chain of imports has to produce at least one prerequisite link
        assert!(plan.chapters.iter().any(|c| !c.prerequisites.is_empty()));
    }

    #[test]
    fn import_cycle_still_yields_a_total_order() {
        let abstractions = vec![
            abstraction("id_a", "Alpha", "alpha", &["beta"], 2),
            abstraction("id_b", "Beta", "beta", &["alpha"], 2),
        ];

        let (plan, graph) = plan_for(&abstractions);
        assert!(!graph.warnings.is_empty());

        let total: usize = plan.chapters.iter().map(|c| c.members.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn difficulty_tiers_follow_mean_complexity() {
        let easy = vec![abstraction("id_a", "Alpha", "alpha", &[], 1)];
        let (plan, _) = plan_for(&easy);
        assert_eq!(plan.chapters[0].difficulty, Difficulty::Beginner);

        let hard = vec![abstraction("id_b", "Beta", "beta", &[], 9)];
        let (plan, _) = plan_for(&hard);
        assert_eq!(plan.chapters[0].difficulty, Difficulty::Advanced);
    }
}
