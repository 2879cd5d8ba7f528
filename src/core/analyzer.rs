//! Relationship analysis
//!
//! Consumes the abstraction set and produces the directed, weighted
//! relationship graph plus cluster groupings. Import and inheritance edges
//! are exact; call and composition edges are best-effort lexical
//! inference, so false positives and negatives are expected and accepted.

use std::collections::{BTreeMap, HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::error::{Result, TutorError};

use super::extractor::{Abstraction, AbstractionKind};

/// Kind of a directed relationship edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Imports,
    Inherits,
    Calls,
    Composes,
}

impl RelationKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::Inherits => "inherits",
            Self::Calls => "calls",
            Self::Composes => "composes",
        }
    }

    /// Whether this kind constrains the learning order
    fn is_ordering(&self) -> bool {
        matches!(self, Self::Imports | Self::Inherits)
    }
}

/// A directed, typed, weighted edge between two abstractions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Source abstraction identifier
    pub source: String,

    /// Target abstraction identifier
    pub target: String,

    /// Edge kind
    pub kind: RelationKind,

    /// Confidence/frequency in [0, 1]
    pub strength: f64,
}

/// The full relationship set viewed as a graph over abstractions.
///
/// Owned by the analyzer; read-only for the planner and assembler. The
/// ordering edges are a derived structure so cycle breaking never mutates
/// the relationship set itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// All surviving relationships, sorted by (source, target, kind)
    pub edges: Vec<Relationship>,

    /// Acyclic imports/inherits pairs used for topological ordering,
    /// after deterministic cycle breaking
    pub ordering_edges: Vec<(String, String)>,

    /// Cluster index per abstraction identifier, contiguous from 0
    pub clusters: HashMap<String, usize>,

    /// Cycle-break and consistency warnings accumulated during analysis
    pub warnings: Vec<String>,
}

impl DependencyGraph {
    /// Direct neighbors (either direction) of an abstraction, strongest first
    pub fn neighbors(&self, id: &str) -> Vec<&Relationship> {
        let mut related: Vec<&Relationship> = self
            .edges
            .iter()
            .filter(|e| e.source == id || e.target == id)
            .collect();
        related.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (&a.source, &a.target).cmp(&(&b.source, &b.target)))
        });
        related
    }

    /// Identifiers `id` directly depends on, via any edge kind.
    ///
    /// Edges point from the dependent to its dependency (an importer is
    /// the source), so predecessors in learning order are the targets of
    /// the outgoing edges.
    pub fn direct_predecessors(&self, id: &str) -> Vec<&str> {
        let mut targets: Vec<&str> = self
            .edges
            .iter()
            .filter(|e| e.source == id && e.target != id)
            .map(|e| e.target.as_str())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// Edges at or above the clustering "strong" threshold
    pub fn strong_edges(&self, threshold: f64) -> Vec<&Relationship> {
        self.edges.iter().filter(|e| e.strength >= threshold).collect()
    }
}

/// Produces the relationship graph from the abstraction set
pub struct RelationshipAnalyzer {
    config: AnalysisConfig,
}

impl RelationshipAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn analyze(&self, abstractions: &[Abstraction]) -> Result<DependencyGraph> {
        let by_id: BTreeMap<&str, &Abstraction> =
            abstractions.iter().map(|a| (a.id.as_str(), a)).collect();

        // Name and module lookups; BTreeMap keeps candidate iteration
        // deterministic
        let mut by_name: BTreeMap<&str, Vec<&Abstraction>> = BTreeMap::new();
        let mut by_module: BTreeMap<&str, Vec<&Abstraction>> = BTreeMap::new();
        for abstraction in abstractions {
            by_name
                .entry(abstraction.name.as_str())
                .or_default()
                .push(abstraction);
            by_module
                .entry(abstraction.module.as_str())
                .or_default()
                .push(abstraction);
        }

        let mut edges: Vec<Relationship> = Vec::new();
        let mut warnings = Vec::new();

        // One compiled matcher per target name, shared across all source
        // bodies; names under 3 characters make reference scanning pure
        // noise and are skipped outright
        let call_targets: Vec<(&Abstraction, Regex)> = abstractions
            .iter()
            .filter(|target| target.name.len() >= 3)
            .filter_map(|target| {
                Regex::new(&format!(r"\b{}\b", regex::escape(&target.name)))
                    .ok()
                    .map(|re| (target, re))
            })
            .collect();

        for abstraction in abstractions {
            self.import_edges(abstraction, &by_module, &mut edges);
            self.inherit_edges(abstraction, &by_name, &mut edges);
            self.call_edges(abstraction, &call_targets, &mut edges);
            self.compose_edges(abstraction, &by_name, &mut edges);
        }

        // Keep the strongest instance of each (source, target, kind)
        let mut strongest: BTreeMap<(String, String, RelationKind), f64> = BTreeMap::new();
        for edge in edges {
            let key = (edge.source, edge.target, edge.kind);
            let entry = strongest.entry(key).or_insert(0.0);
            if edge.strength > *entry {
                *entry = edge.strength;
            }
        }

        let mut edges: Vec<Relationship> = strongest
            .into_iter()
            .filter(|(_, strength)| *strength >= self.config.min_relationship_strength)
            .map(|((source, target, kind), strength)| Relationship {
                source,
                target,
                kind,
                strength,
            })
            .collect();
        edges.sort_by(|a, b| {
            (&a.source, &a.target, a.kind).cmp(&(&b.source, &b.target, b.kind))
        });

        // Endpoint validation before anything downstream trusts the graph
        for edge in &edges {
            if !by_id.contains_key(edge.source.as_str()) || !by_id.contains_key(edge.target.as_str())
            {
                return Err(TutorError::invariant(
                    "analyzer",
                    format!(
                        "relationship {} -> {} references an unknown abstraction",
                        edge.source, edge.target
                    ),
                ));
            }
        }

        let ordering_edges = self.break_cycles(&edges, &mut warnings);
        let clusters = self.cluster(abstractions, &edges);

        debug!(
            "Analyzed {} relationships across {} clusters",
            edges.len(),
            clusters.values().collect::<HashSet<_>>().len()
        );

        Ok(DependencyGraph {
            edges,
            ordering_edges,
            clusters,
            warnings,
        })
    }

    /// Import edges: recorded import names matched against declaring
    /// modules, strength 1.0
    fn import_edges(
        &self,
        abstraction: &Abstraction,
        by_module: &BTreeMap<&str, Vec<&Abstraction>>,
        edges: &mut Vec<Relationship>,
    ) {
        for import in &abstraction.imports {
            let Some(targets) = by_module.get(import.as_str()) else {
                continue;
            };
            for target in targets {
                // Self-loops and same-module matches carry no information
                if target.id == abstraction.id || target.module == abstraction.module {
                    continue;
                }
                edges.push(Relationship {
                    source: abstraction.id.clone(),
                    target: target.id.clone(),
                    kind: RelationKind::Imports,
                    strength: 1.0,
                });
            }
        }
    }

    /// Inheritance edges from declared supertype references, strength 1.0
    fn inherit_edges(
        &self,
        abstraction: &Abstraction,
        by_name: &BTreeMap<&str, Vec<&Abstraction>>,
        edges: &mut Vec<Relationship>,
    ) {
        for supertype in &abstraction.supertypes {
            let Some(targets) = by_name.get(supertype.as_str()) else {
                continue;
            };
            for target in targets {
                if target.id == abstraction.id {
                    continue;
                }
                if !matches!(
                    target.kind,
                    AbstractionKind::Class | AbstractionKind::Interface
                ) {
                    continue;
                }
                edges.push(Relationship {
                    source: abstraction.id.clone(),
                    target: target.id.clone(),
                    kind: RelationKind::Inherits,
                    strength: 1.0,
                });
            }
        }
    }

    /// Call edges from lexical reference scanning, strength proportional
    /// to reference density (a reference every ~8 body lines saturates)
    fn call_edges(
        &self,
        abstraction: &Abstraction,
        call_targets: &[(&Abstraction, Regex)],
        edges: &mut Vec<Relationship>,
    ) {
        let body_lines = abstraction.body.lines().count().max(1);

        for (target, reference_re) in call_targets {
            let mut references = reference_re.find_iter(&abstraction.body).count();

            if target.id == abstraction.id {
                // A recursive call shows up as occurrences beyond the
                // declaration itself; only then is a self-loop real
                references = references.saturating_sub(1);
                if references == 0 {
                    continue;
                }
            } else if references == 0 {
                continue;
            }

            let strength = ((references * 8) as f64 / body_lines as f64).min(1.0);
            edges.push(Relationship {
                source: abstraction.id.clone(),
                target: target.id.clone(),
                kind: RelationKind::Calls,
                strength,
            });
        }
    }

    /// Composition edges from member names referencing other abstractions;
    /// exact matches are explicit (1.0), case-insensitive ones inferred (0.6)
    fn compose_edges(
        &self,
        abstraction: &Abstraction,
        by_name: &BTreeMap<&str, Vec<&Abstraction>>,
        edges: &mut Vec<Relationship>,
    ) {
        for member in &abstraction.members {
            for (name, targets) in by_name.iter() {
                let strength = if member == name {
                    1.0
                } else if member.eq_ignore_ascii_case(name) {
                    0.6
                } else {
                    continue;
                };

                for target in targets {
                    if target.id == abstraction.id {
                        continue;
                    }
                    if !matches!(
                        target.kind,
                        AbstractionKind::Class | AbstractionKind::Interface
                    ) {
                        continue;
                    }
                    edges.push(Relationship {
                        source: abstraction.id.clone(),
                        target: target.id.clone(),
                        kind: RelationKind::Composes,
                        strength,
                    });
                }
            }
        }
    }

    /// Restrict to imports/inherits edges and break any strongly connected
    /// component by dropping its lowest-strength edge until the ordering
    /// graph is acyclic. Circular static dependencies indicate malformed
    /// input (or misdetection), so this warns and never fails.
    fn break_cycles(
        &self,
        edges: &[Relationship],
        warnings: &mut Vec<String>,
    ) -> Vec<(String, String)> {
        let mut ordering: Vec<Relationship> = edges
            .iter()
            .filter(|e| e.kind.is_ordering() && e.source != e.target)
            .cloned()
            .collect();

        loop {
            let components = strongly_connected_components(&ordering);
            let Some(component) = components.iter().find(|c| c.len() > 1) else {
                break;
            };
            let members: HashSet<&str> = component.iter().map(String::as_str).collect();

            // Lowest strength first; ties broken by (source, target) so the
            // same edge is dropped on every run
            let victim = ordering
                .iter()
                .enumerate()
                .filter(|(_, e)| {
                    members.contains(e.source.as_str()) && members.contains(e.target.as_str())
                })
                .min_by(|(_, a), (_, b)| {
                    a.strength
                        .partial_cmp(&b.strength)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| (&a.source, &a.target).cmp(&(&b.source, &b.target)))
                })
                .map(|(index, _)| index);

            match victim {
                Some(index) => {
                    let removed = ordering.remove(index);
                    warn!(
                        "Breaking dependency cycle by dropping {} edge {} -> {}",
                        removed.kind.label(),
                        removed.source,
                        removed.target
                    );
                    warnings.push(format!(
                        "circular static dependency broken: dropped {} edge {} -> {}",
                        removed.kind.label(),
                        removed.source,
                        removed.target
                    ));
                }
                None => break,
            }
        }

        ordering
            .into_iter()
            .map(|e| (e.source, e.target))
            .collect()
    }

    /// Connected components over edges at or above the strong threshold.
    ///
    /// Cluster indices are assigned by first appearance in abstraction
    /// order, so identical input yields identical numbering.
    fn cluster(
        &self,
        abstractions: &[Abstraction],
        edges: &[Relationship],
    ) -> HashMap<String, usize> {
        let ids: Vec<&str> = abstractions.iter().map(|a| a.id.as_str()).collect();
        let index_of: HashMap<&str, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut parent: Vec<usize> = (0..ids.len()).collect();

        fn find(parent: &mut Vec<usize>, node: usize) -> usize {
            if parent[node] != node {
                let root = find(parent, parent[node]);
                parent[node] = root;
            }
            parent[node]
        }

        for edge in edges {
            if edge.strength < self.config.strong_cluster_threshold {
                continue;
            }
            let (Some(&a), Some(&b)) = (
                index_of.get(edge.source.as_str()),
                index_of.get(edge.target.as_str()),
            ) else {
                continue;
            };
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }

        let mut cluster_of_root: HashMap<usize, usize> = HashMap::new();
        let mut clusters = HashMap::new();
        for (index, id) in ids.iter().enumerate() {
            let root = find(&mut parent, index);
            let next = cluster_of_root.len();
            let cluster = *cluster_of_root.entry(root).or_insert(next);
            clusters.insert((*id).to_string(), cluster);
        }
        clusters
    }
}

/// Tarjan's algorithm over the given edge list
fn strongly_connected_components(edges: &[Relationship]) -> Vec<Vec<String>> {
    let mut nodes: Vec<&str> = edges
        .iter()
        .flat_map(|e| [e.source.as_str(), e.target.as_str()])
        .collect();
    nodes.sort_unstable();
    nodes.dedup();

    let index_of: HashMap<&str, usize> =
        nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in edges {
        adjacency[index_of[edge.source.as_str()]].push(index_of[edge.target.as_str()]);
    }

    struct State<'a> {
        adjacency: &'a [Vec<usize>],
        index: Vec<Option<usize>>,
        lowlink: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        counter: usize,
        components: Vec<Vec<usize>>,
    }

    fn visit(state: &mut State, node: usize) {
        state.index[node] = Some(state.counter);
        state.lowlink[node] = state.counter;
        state.counter += 1;
        state.stack.push(node);
        state.on_stack[node] = true;

        let successors = state.adjacency[node].clone();
        for next in successors {
            if state.index[next].is_none() {
                visit(state, next);
                state.lowlink[node] = state.lowlink[node].min(state.lowlink[next]);
            } else if state.on_stack[next] {
                state.lowlink[node] = state.lowlink[node].min(state.index[next].unwrap());
            }
        }

        if state.lowlink[node] == state.index[node].unwrap() {
            let mut component = Vec::new();
            while let Some(top) = state.stack.pop() {
                state.on_stack[top] = false;
                component.push(top);
                if top == node {
                    break;
                }
            }
            state.components.push(component);
        }
    }

    let mut state = State {
        adjacency: &adjacency,
        index: vec![None; nodes.len()],
        lowlink: vec![0; nodes.len()],
        on_stack: vec![false; nodes.len()],
        stack: Vec::new(),
        counter: 0,
        components: Vec::new(),
    };

    for node in 0..nodes.len() {
        if state.index[node].is_none() {
            visit(&mut state, node);
        }
    }

    state
        .components
        .into_iter()
        .map(|component| {
            component
                .into_iter()
                .map(|index| nodes[index].to_string())
                .collect()
        })
        .collect()
}
