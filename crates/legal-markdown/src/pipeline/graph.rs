//! Step dependency graph. Cycle detection runs as its own pass before the
//! ordering pass, so ordering can assume a DAG.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet};

use super::error::PipelineError;

#[derive(Debug, Clone)]
struct Node {
    order: i32,
    /// Registration position, the final tie-breaker.
    index: usize,
    dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str, order: i32, dependencies: &[String]) {
        let index = self.nodes.len();
        self.nodes.insert(
            name.to_string(),
            Node {
                order,
                index,
                dependencies: dependencies.to_vec(),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every dependency must name a node.
    pub fn validate_dependencies(&self) -> Result<(), PipelineError> {
        for (name, node) in &self.nodes {
            for dependency in &node.dependencies {
                if !self.nodes.contains_key(dependency) {
                    return Err(PipelineError::UnknownDependency {
                        step: name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the first cycle found as a closed path, e.g. `a -> b -> a`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        for name in self.names_by_priority() {
            if let Some(cycle) = self.visit(name, &mut visited, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|n| *n == name) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Some(cycle);
        }
        if !visited.insert(name) {
            return None;
        }
        stack.push(name);
        if let Some(node) = self.nodes.get(name) {
            for dependency in &node.dependencies {
                if let Some(cycle) = self.visit(dependency, visited, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        None
    }

    /// Topological order. Among ready steps the lowest `order` runs first,
    /// then the earliest registered.
    pub fn execution_order(&self) -> Result<Vec<String>, PipelineError> {
        self.validate_dependencies()?;
        if let Some(cycle) = self.find_cycle() {
            return Err(PipelineError::CircularDependency(cycle));
        }

        let mut pending: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(name, node)| (name.as_str(), node.dependencies.len()))
            .collect();
        let mut ready = BinaryHeap::new();
        for (name, node) in &self.nodes {
            if node.dependencies.is_empty() {
                ready.push(Reverse((node.order, node.index, name.as_str())));
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, _, name))) = ready.pop() {
            order.push(name.to_string());
            for (other, node) in &self.nodes {
                let edges = node.dependencies.iter().filter(|d| d.as_str() == name).count();
                if edges == 0 {
                    continue;
                }
                if let Some(count) = pending.get_mut(other.as_str()) {
                    *count -= edges;
                    if *count == 0 {
                        ready.push(Reverse((node.order, node.index, other.as_str())));
                    }
                }
            }
        }
        Ok(order)
    }

    fn names_by_priority(&self) -> Vec<&str> {
        let mut names: Vec<(&i32, &usize, &str)> = self
            .nodes
            .iter()
            .map(|(name, node)| (&node.order, &node.index, name.as_str()))
            .collect();
        names.sort();
        names.into_iter().map(|(_, _, name)| name).collect()
    }
}
