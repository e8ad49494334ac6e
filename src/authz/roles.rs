//! Role hierarchy: one directed graph per domain, edges pointing from a member
//! to the role it belongs to.

use std::collections::{HashMap, VecDeque};

/// Domain used by grouping rules that carry no domain field.
pub const DEFAULT_DOMAIN: &str = "";

/// Arena of interned names with adjacency lists of outgoing membership edges.
#[derive(Debug, Clone, Default)]
struct RoleGraph {
    ids: HashMap<String, usize>,
    names: Vec<String>,
    edges: Vec<Vec<usize>>,
}

impl RoleGraph {
    fn intern(&mut self, name: &str) -> usize {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len();
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        self.edges.push(Vec::new());
        id
    }

    fn id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    fn add_edge(&mut self, from: &str, to: &str) -> bool {
        let from = self.intern(from);
        let to = self.intern(to);
        if self.edges[from].contains(&to) {
            return false;
        }
        self.edges[from].push(to);
        true
    }

    fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let (Some(from), Some(to)) = (self.id(from), self.id(to)) else {
            return false;
        };
        let before = self.edges[from].len();
        self.edges[from].retain(|&n| n != to);
        self.edges[from].len() != before
    }

    /// Breadth-first walk from `start`, calling `visit` for every node reached
    /// through at least one edge. Stops early when `visit` returns `true`.
    /// Each node is expanded at most once, so cycles terminate.
    fn walk(&self, start: usize, mut visit: impl FnMut(usize) -> bool) -> bool {
        let mut seen = vec![false; self.names.len()];
        let mut queue = VecDeque::from([start]);
        seen[start] = true;

        while let Some(node) = queue.pop_front() {
            for &next in &self.edges[node] {
                if next == start || seen[next] {
                    continue;
                }
                seen[next] = true;
                if visit(next) {
                    return true;
                }
                queue.push_back(next);
            }
        }
        false
    }
}

/// Role inheritance for one grouping type (`g`, `g2`, ...), partitioned by domain.
#[derive(Debug, Clone, Default)]
pub struct RoleManager {
    domains: HashMap<String, RoleGraph>,
}

impl RoleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `name1` is a member of `name2`. Returns `false` if the link existed.
    pub fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        self.domains
            .entry(domain.unwrap_or(DEFAULT_DOMAIN).to_string())
            .or_default()
            .add_edge(name1, name2)
    }

    pub fn remove_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        self.domains
            .get_mut(domain.unwrap_or(DEFAULT_DOMAIN))
            .is_some_and(|g| g.remove_edge(name1, name2))
    }

    /// Whether `name2` is reachable from `name1` through zero or more links.
    pub fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        if name1 == name2 {
            return true;
        }
        let Some(graph) = self.domains.get(domain.unwrap_or(DEFAULT_DOMAIN)) else {
            return false;
        };
        let (Some(from), Some(to)) = (graph.id(name1), graph.id(name2)) else {
            return false;
        };
        graph.walk(from, |node| node == to)
    }

    /// Direct and inherited roles of `name`, in breadth-first discovery order.
    pub fn roles_of(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let Some(graph) = self.domains.get(domain.unwrap_or(DEFAULT_DOMAIN)) else {
            return Vec::new();
        };
        let Some(start) = graph.id(name) else {
            return Vec::new();
        };
        let mut roles = Vec::new();
        graph.walk(start, |node| {
            roles.push(graph.names[node].clone());
            false
        });
        roles
    }

    /// Roles `name` is linked to by a single edge.
    pub fn direct_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let Some(graph) = self.domains.get(domain.unwrap_or(DEFAULT_DOMAIN)) else {
            return Vec::new();
        };
        graph
            .id(name)
            .map(|id| {
                graph.edges[id]
                    .iter()
                    .map(|&n| graph.names[n].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names linked directly to `role`.
    pub fn direct_members(&self, role: &str, domain: Option<&str>) -> Vec<String> {
        let Some(graph) = self.domains.get(domain.unwrap_or(DEFAULT_DOMAIN)) else {
            return Vec::new();
        };
        let Some(target) = graph.id(role) else {
            return Vec::new();
        };
        graph
            .edges
            .iter()
            .enumerate()
            .filter(|(_, out)| out.contains(&target))
            .map(|(id, _)| graph.names[id].clone())
            .collect()
    }
}
