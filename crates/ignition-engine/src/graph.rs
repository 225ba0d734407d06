use std::collections::{HashMap, HashSet, VecDeque};

use ignition_types::ConfigError;

/// Immutable dependency DAG over the registered signals.
///
/// Signals are interned to indices in registration order. An edge
/// `(signal, prerequisite)` means `signal` must not start until
/// `prerequisite` has succeeded. Construction validates the whole
/// relation: duplicate names, unknown references, self-edges, and cycles
/// are rejected with the matching [`ConfigError`].
///
/// Adjacency is precomputed in both directions, so the query operations
/// are O(1) average. The topological order is stable: primary key is
/// depth (longest prerequisite chain), secondary key is registration
/// index.
#[derive(Debug)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// Prerequisites of each signal.
    dependencies: Vec<Vec<usize>>,
    /// Signals that depend on each signal.
    dependents: Vec<Vec<usize>>,
    depths: Vec<usize>,
    topo: Vec<usize>,
    edge_count: usize,
}

impl DependencyGraph {
    /// Builds the graph from registration-ordered names and
    /// `(signal, prerequisite)` edges.
    pub fn build(names: Vec<String>, edges: &[(String, String)]) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(ConfigError::DuplicateName { name: name.clone() });
            }
        }

        let n = names.len();
        let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut seen_edges = HashSet::new();
        let mut edge_count = 0;

        for (signal, prerequisite) in edges {
            let &s = index.get(signal).ok_or_else(|| ConfigError::UnknownDependency {
                signal: signal.clone(),
                dependency: prerequisite.clone(),
            })?;
            let &p = index.get(prerequisite).ok_or_else(|| ConfigError::UnknownDependency {
                signal: signal.clone(),
                dependency: prerequisite.clone(),
            })?;
            if s == p {
                return Err(ConfigError::SelfDependency { name: signal.clone() });
            }
            // Repeated identical edges collapse to one.
            if !seen_edges.insert((s, p)) {
                continue;
            }
            dependencies[s].push(p);
            dependents[p].push(s);
            edge_count += 1;
        }

        let (depths, topo) = Self::order(&names, &dependencies, &dependents)?;

        Ok(Self {
            names,
            index,
            dependencies,
            dependents,
            depths,
            topo,
            edge_count,
        })
    }

    /// Kahn's algorithm: computes depths and the stable topological
    /// order, or extracts a cycle for the error.
    fn order(
        names: &[String],
        dependencies: &[Vec<usize>],
        dependents: &[Vec<usize>],
    ) -> Result<(Vec<usize>, Vec<usize>), ConfigError> {
        let n = names.len();
        let mut pending: Vec<usize> = dependencies.iter().map(|d| d.len()).collect();
        let mut depths = vec![0usize; n];
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut processed = 0;

        while let Some(u) = queue.pop_front() {
            processed += 1;
            for &v in &dependents[u] {
                depths[v] = depths[v].max(depths[u] + 1);
                pending[v] -= 1;
                if pending[v] == 0 {
                    queue.push_back(v);
                }
            }
        }

        if processed < n {
            return Err(ConfigError::DependencyCycle {
                cycle: Self::extract_cycle(names, dependencies, &pending),
            });
        }

        let mut topo: Vec<usize> = (0..n).collect();
        topo.sort_by_key(|&i| (depths[i], i));
        Ok((depths, topo))
    }

    /// Walks prerequisites among the unresolved nodes until one repeats.
    fn extract_cycle(names: &[String], dependencies: &[Vec<usize>], pending: &[usize]) -> Vec<String> {
        let start = match (0..names.len()).find(|&i| pending[i] > 0) {
            Some(i) => i,
            None => return Vec::new(),
        };

        let mut path = Vec::new();
        let mut seen = HashMap::new();
        let mut current = start;
        loop {
            if let Some(&at) = seen.get(&current) {
                let mut cycle: Vec<String> = path[at..].iter().map(|&i: &usize| names[i].clone()).collect();
                cycle.push(names[current].clone());
                return cycle;
            }
            seen.insert(current, path.len());
            path.push(current);
            // A node stuck in Kahn's algorithm always has an unresolved
            // prerequisite, so this walk cannot dead-end.
            current = match dependencies[current].iter().find(|&&p| pending[p] > 0) {
                Some(&p) => p,
                None => return path.iter().map(|&i| names[i].clone()).collect(),
            };
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether any dependency edges were declared.
    pub fn has_edges(&self) -> bool {
        self.edge_count > 0
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Prerequisites of the signal at `index`.
    pub fn dependencies_of(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Signals that directly depend on the signal at `index`.
    pub fn dependents_of(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Prerequisite names of a signal, in declaration order.
    pub fn dependency_names(&self, index: usize) -> Vec<String> {
        self.dependencies[index].iter().map(|&i| self.names[i].clone()).collect()
    }

    /// Signals with no prerequisites, in registration order.
    pub fn roots(&self) -> Vec<usize> {
        (0..self.names.len()).filter(|&i| self.dependencies[i].is_empty()).collect()
    }

    /// Signals with no dependents, in registration order.
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.names.len()).filter(|&i| self.dependents[i].is_empty()).collect()
    }

    /// Longest prerequisite chain length for the signal at `index`.
    pub fn depth(&self, index: usize) -> usize {
        self.depths[index]
    }

    /// All signals in stable topological order (depth, then registration).
    pub fn topo_order(&self) -> &[usize] {
        &self.topo
    }

    /// All transitive dependents of `index`, breadth-first.
    pub fn transitive_dependents(&self, index: usize) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([index]);
        let mut out = Vec::new();
        while let Some(u) = queue.pop_front() {
            for &v in &self.dependents[u] {
                if seen.insert(v) {
                    out.push(v);
                    queue.push_back(v);
                }
            }
        }
        out
    }
}
