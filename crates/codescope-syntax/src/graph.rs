use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// A call name matching more chunks than this (outside the caller's own file)
/// is treated as unresolvable rather than fanned out.
pub const MAX_AMBIGUOUS_TARGETS: usize = 3;

/// A chunk as seen by the call graph.
///
/// # Examples
///
/// ```
/// use codescope_syntax::CallSite;
///
/// let site = CallSite {
///     id: "src/a.rs:run:1a2b3c4d".into(),
///     file: "src/a.rs".into(),
///     symbol: "run".into(),
///     call_names: vec!["helper".into()],
/// };
/// assert_eq!(site.call_names.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Chunk id.
    pub id: String,
    /// File the chunk lives in.
    pub file: String,
    /// Symbol name other chunks call it by.
    pub symbol: String,
    /// Raw callee names found in the chunk body.
    pub call_names: Vec<String>,
}

/// Directed call graph between chunks of one index generation.
///
/// An edge `a -> b` means chunk `a` calls chunk `b`. Call names resolve to
/// same-file chunks first; otherwise to every chunk with that symbol name,
/// provided there are at most [`MAX_AMBIGUOUS_TARGETS`] of them. Self-edges are
/// never created.
///
/// # Examples
///
/// ```
/// use codescope_syntax::{CallGraph, CallSite};
///
/// let sites = vec![
///     CallSite { id: "a".into(), file: "x.rs".into(), symbol: "caller".into(), call_names: vec!["callee".into()] },
///     CallSite { id: "b".into(), file: "y.rs".into(), symbol: "callee".into(), call_names: vec![] },
/// ];
/// let graph = CallGraph::build(&sites);
/// assert_eq!(graph.call_targets("a"), vec!["b"]);
/// assert_eq!(graph.callers("b"), vec!["a"]);
/// ```
pub struct CallGraph {
    graph: DiGraph<String, ()>,
    id_to_index: HashMap<String, NodeIndex>,
}

impl CallGraph {
    /// Build the graph, resolving each site's call names.
    pub fn build(sites: &[CallSite]) -> Self {
        let mut graph = DiGraph::new();
        let mut id_to_index: HashMap<String, NodeIndex> = HashMap::new();
        let mut by_symbol: HashMap<&str, Vec<&CallSite>> = HashMap::new();

        for site in sites {
            if id_to_index.contains_key(&site.id) {
                continue;
            }
            let idx = graph.add_node(site.id.clone());
            id_to_index.insert(site.id.clone(), idx);
            by_symbol.entry(site.symbol.as_str()).or_default().push(site);
        }

        for site in sites {
            let Some(&from_idx) = id_to_index.get(&site.id) else {
                continue;
            };
            for name in &site.call_names {
                let Some(candidates) = by_symbol.get(name.as_str()) else {
                    continue; // Unresolved call (library or builtin)
                };

                let same_file: Vec<&&CallSite> =
                    candidates.iter().filter(|c| c.file == site.file).collect();
                let targets: Vec<&&CallSite> = if !same_file.is_empty() {
                    same_file
                } else if candidates.len() <= MAX_AMBIGUOUS_TARGETS {
                    candidates.iter().collect()
                } else {
                    continue;
                };

                for target in targets {
                    if target.id == site.id {
                        continue;
                    }
                    if let Some(&to_idx) = id_to_index.get(&target.id) {
                        graph.update_edge(from_idx, to_idx, ());
                    }
                }
            }
        }

        Self { graph, id_to_index }
    }

    /// Ids of chunks that `id` calls, sorted.
    pub fn call_targets(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Ids of chunks that call `id`, sorted.
    pub fn callers(&self, id: &str) -> Vec<String> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.id_to_index.get(id) else {
            return Vec::new();
        };
        let set: BTreeSet<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        set.into_iter().collect()
    }

    /// Every node's `(call_targets, callers)`, keyed by chunk id.
    pub fn edges(&self) -> BTreeMap<String, (Vec<String>, Vec<String>)> {
        self.id_to_index
            .keys()
            .map(|id| (id.clone(), (self.call_targets(id), self.callers(id))))
            .collect()
    }

    /// Number of chunks in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of distinct call edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(id: &str, file: &str, symbol: &str, calls: &[&str]) -> CallSite {
        CallSite {
            id: id.into(),
            file: file.into(),
            symbol: symbol.into(),
            call_names: calls.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn same_file_target_wins_over_other_files() {
        let sites = vec![
            site("a:main", "a.rs", "main", &["load"]),
            site("a:load", "a.rs", "load", &[]),
            site("b:load", "b.rs", "load", &[]),
        ];
        let graph = CallGraph::build(&sites);
        assert_eq!(graph.call_targets("a:main"), vec!["a:load"]);
        assert!(graph.callers("b:load").is_empty());
    }

    #[test]
    fn ambiguous_names_fan_out_up_to_limit() {
        let mut sites = vec![site("main", "main.rs", "main", &["init"])];
        for i in 0..MAX_AMBIGUOUS_TARGETS {
            sites.push(site(&format!("init{i}"), &format!("m{i}.rs"), "init", &[]));
        }
        let graph = CallGraph::build(&sites);
        assert_eq!(graph.call_targets("main").len(), MAX_AMBIGUOUS_TARGETS);

        sites.push(site("init_extra", "extra.rs", "init", &[]));
        let graph = CallGraph::build(&sites);
        assert!(graph.call_targets("main").is_empty());
    }

    #[test]
    fn no_self_edges_and_no_duplicates() {
        let sites = vec![
            site("r", "r.rs", "recurse", &["recurse", "step", "step"]),
            site("s", "r.rs", "step", &[]),
        ];
        let graph = CallGraph::build(&sites);
        assert_eq!(graph.call_targets("r"), vec!["s"]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn every_edge_points_at_a_known_node() {
        let sites = vec![
            site("a", "a.rs", "a", &["b", "println"]),
            site("b", "b.rs", "b", &["a"]),
        ];
        let graph = CallGraph::build(&sites);
        let edges = graph.edges();
        assert_eq!(edges.len(), 2);
        for (targets, callers) in edges.values() {
            for id in targets.iter().chain(callers) {
                assert!(edges.contains_key(id));
            }
        }
        assert_eq!(edges["a"], (vec!["b".to_string()], vec!["b".to_string()]));
    }

    #[test]
    fn unknown_id_has_no_neighbors() {
        let graph = CallGraph::build(&[]);
        assert!(graph.call_targets("missing").is_empty());
        assert_eq!(graph.node_count(), 0);
    }
}
