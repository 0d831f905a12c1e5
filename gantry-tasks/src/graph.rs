//! Dependency graph over a task tree.
//!
//! The graph spans a root task and all of its descendants: one node per
//! task, one edge per dependency (prerequisite -> dependent) and per
//! parent/child relation. Cycle detection runs on this local graph; cycles
//! across separately stored trees are the service layer's responsibility.

use gantry_core::{Task, TaskDependencyKind, TaskGraphError, TaskId, TaskStatus};
use std::collections::{HashMap, HashSet, VecDeque};

/// Maximum allowed task-hierarchy depth.
pub const MAX_HIERARCHY_DEPTH: usize = 10;

/// Directed graph over a task tree.
pub struct DependencyGraph {
    /// node -> expected hours (longest-path weight)
    weights: HashMap<TaskId, f64>,
    /// prerequisite -> dependents
    edges: HashMap<TaskId, Vec<TaskId>>,
    /// dependent -> prerequisite count (in-degree for Kahn's algorithm)
    in_degree: HashMap<TaskId, usize>,
}

impl DependencyGraph {
    /// Build the graph for `root` and its descendants.
    pub fn from_task_tree(root: &Task) -> Self {
        let tasks = root.flatten();
        let ids: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();

        let mut graph = Self {
            weights: HashMap::new(),
            edges: HashMap::new(),
            in_degree: HashMap::new(),
        };

        for task in &tasks {
            graph.weights.insert(task.id, task.estimate.expected_hours());
            graph.edges.entry(task.id).or_default();
            graph.in_degree.entry(task.id).or_default();
        }

        for task in &tasks {
            // Dependency edges: prerequisite -> dependent. Edges that point
            // outside this tree are ignored here (cross-tree obligations are
            // validated by the service layer).
            for dep in &task.dependencies {
                if ids.contains(&dep.target_task_id) {
                    graph.add_edge(dep.target_task_id, task.id);
                }
            }
            // Parent/child edges keep subtree ordering visible to the
            // cycle check.
            for child in &task.children {
                graph.add_edge(task.id, child.id);
            }
        }

        graph
    }

    fn add_edge(&mut self, from: TaskId, to: TaskId) {
        self.edges.entry(from).or_default().push(to);
        *self.in_degree.entry(to).or_default() += 1;
        self.in_degree.entry(from).or_default();
        self.weights.entry(from).or_insert(0.0);
        self.weights.entry(to).or_insert(0.0);
    }

    pub fn node_count(&self) -> usize {
        self.weights.len()
    }

    /// Find a dependency cycle, if one exists, via DFS coloring.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: HashMap<TaskId, Color> =
            self.weights.keys().map(|id| (*id, Color::White)).collect();
        let mut stack_path: Vec<TaskId> = Vec::new();

        fn dfs(
            node: TaskId,
            edges: &HashMap<TaskId, Vec<TaskId>>,
            colors: &mut HashMap<TaskId, Color>,
            path: &mut Vec<TaskId>,
        ) -> Option<Vec<TaskId>> {
            colors.insert(node, Color::Gray);
            path.push(node);

            for next in edges.get(&node).into_iter().flatten() {
                match colors.get(next).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        // Found a back edge; slice out the cycle
                        let start = path.iter().position(|id| id == next).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(*next);
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = dfs(*next, edges, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }

            path.pop();
            colors.insert(node, Color::Black);
            None
        }

        let nodes: Vec<TaskId> = self.weights.keys().copied().collect();
        for node in nodes {
            if colors.get(&node) == Some(&Color::White) {
                if let Some(cycle) = dfs(node, &self.edges, &mut colors, &mut stack_path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Topological execution order (Kahn's algorithm). Fails with
    /// `DependencyCycle` when the graph is not a DAG.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, TaskGraphError> {
        let mut in_degree = self.in_degree.clone();
        let mut queue: VecDeque<TaskId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.weights.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for next in self.edges.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        if order.len() != self.weights.len() {
            let path = self.find_cycle().unwrap_or_default();
            return Err(TaskGraphError::DependencyCycle { path });
        }
        Ok(order)
    }

    /// Critical path: the longest path through the DAG weighted by each
    /// node's expected hours. Returns the path ids in execution order.
    pub fn critical_path(&self) -> Result<Vec<TaskId>, TaskGraphError> {
        let order = self.topological_order()?;

        let mut dist: HashMap<TaskId, f64> = HashMap::new();
        let mut prev: HashMap<TaskId, TaskId> = HashMap::new();

        for node in &order {
            let weight = self.weights.get(node).copied().unwrap_or(0.0);
            dist.entry(*node).or_insert(weight);
            let node_dist = dist[node];

            for next in self.edges.get(node).into_iter().flatten() {
                let next_weight = self.weights.get(next).copied().unwrap_or(0.0);
                let candidate = node_dist + next_weight;
                if candidate > dist.get(next).copied().unwrap_or(f64::MIN) {
                    dist.insert(*next, candidate);
                    prev.insert(*next, *node);
                }
            }
        }

        let Some((mut current, _)) = dist
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, d)| (*id, *d))
        else {
            return Ok(Vec::new());
        };

        let mut path = vec![current];
        while let Some(previous) = prev.get(&current) {
            path.push(*previous);
            current = *previous;
        }
        path.reverse();
        Ok(path)
    }

    /// Validate the tree: no cycles, hierarchy depth within bounds.
    pub fn validate(root: &Task) -> Result<(), TaskGraphError> {
        let depth = root.depth();
        if depth > MAX_HIERARCHY_DEPTH {
            return Err(TaskGraphError::ComplexityOverflow {
                depth,
                limit: MAX_HIERARCHY_DEPTH,
            });
        }

        let graph = Self::from_task_tree(root);
        if let Some(path) = graph.find_cycle() {
            return Err(TaskGraphError::DependencyCycle { path });
        }
        Ok(())
    }
}

/// Whether one dependency is satisfied for the purpose of *starting* the
/// dependent task. Finish-type constraints bind the finish edge, not the
/// start, so they never block a start.
pub fn dependency_satisfied_for_start(
    kind: TaskDependencyKind,
    prerequisite_status: TaskStatus,
    prerequisite_started: bool,
) -> bool {
    match kind {
        TaskDependencyKind::FinishToStart => prerequisite_status == TaskStatus::Completed,
        TaskDependencyKind::StartToStart => {
            prerequisite_started
                || matches!(
                    prerequisite_status,
                    TaskStatus::InProgress | TaskStatus::Completed
                )
        }
        TaskDependencyKind::FinishToFinish | TaskDependencyKind::StartToFinish => true,
    }
}

/// Whether `task` can start: status pending/ready and every required
/// dependency satisfied per its kind. `lookup` resolves dependency targets
/// that may live anywhere in the tree.
pub fn can_start(task: &Task, lookup: &dyn Fn(TaskId) -> Option<(TaskStatus, bool)>) -> bool {
    if !matches!(task.status, TaskStatus::Pending | TaskStatus::Ready) {
        return false;
    }

    task.dependencies.iter().all(|dep| {
        if !dep.is_required {
            return true;
        }
        match lookup(dep.target_task_id) {
            Some((status, started)) => dependency_satisfied_for_start(dep.kind, status, started),
            // Unresolvable prerequisite blocks the start
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{EntityIdType, SessionId, TaskEstimate, TenantId};

    fn task(title: &str, hours: f64) -> Task {
        let mut t = Task::new(TenantId::now_v7(), SessionId::now_v7(), title).expect("task");
        t.estimate = TaskEstimate::likely(hours);
        t
    }

    #[test]
    fn test_acyclic_tree_validates() {
        let mut root = task("Implement service", 8.0);
        let mut a = task("Implement handler", 2.0);
        let b = task("Test handler", 1.0);
        a.add_dependency(b.id, TaskDependencyKind::FinishToStart, None)
            .expect("edge");
        root.add_child(a);
        root.add_child(b);

        assert!(DependencyGraph::validate(&root).is_ok());
        let graph = DependencyGraph::from_task_tree(&root);
        assert_eq!(graph.node_count(), 3);
        assert!(graph.topological_order().is_ok());
    }

    #[test]
    fn test_cycle_detected() {
        let mut root = task("Implement service", 8.0);
        let mut a = task("Implement handler", 2.0);
        let mut b = task("Test handler", 1.0);
        a.add_dependency(b.id, TaskDependencyKind::FinishToStart, None)
            .expect("edge");
        b.add_dependency(a.id, TaskDependencyKind::FinishToStart, None)
            .expect("edge");
        root.add_child(a);
        root.add_child(b);

        let err = DependencyGraph::validate(&root).unwrap_err();
        assert!(matches!(err, TaskGraphError::DependencyCycle { .. }));

        let graph = DependencyGraph::from_task_tree(&root);
        assert!(graph.topological_order().is_err());
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let mut root = task("Implement pipeline", 4.0);
        let first = task("Implement parser", 1.0);
        let mut second = task("Implement evaluator", 1.0);
        second
            .add_dependency(first.id, TaskDependencyKind::FinishToStart, None)
            .expect("edge");
        let first_id = first.id;
        let second_id = second.id;
        root.add_child(first);
        root.add_child(second);

        let order = DependencyGraph::from_task_tree(&root)
            .topological_order()
            .expect("order");
        let pos_first = order.iter().position(|id| *id == first_id).unwrap();
        let pos_second = order.iter().position(|id| *id == second_id).unwrap();
        assert!(pos_first < pos_second);
    }

    #[test]
    fn test_critical_path_picks_heavier_branch() {
        let mut root = task("Implement app", 1.0);
        let light = task("Implement cli", 1.0);
        let mut heavy = task("Implement engine", 5.0);
        let heavy_child = task("Test engine", 4.0);
        let heavy_child_id = heavy_child.id;
        let heavy_id = heavy.id;
        heavy.add_child(heavy_child);
        root.add_child(light);
        root.add_child(heavy);

        let path = DependencyGraph::from_task_tree(&root)
            .critical_path()
            .expect("path");
        assert_eq!(path.first(), Some(&root.id));
        assert!(path.contains(&heavy_id));
        assert_eq!(path.last(), Some(&heavy_child_id));
    }

    #[test]
    fn test_depth_limit() {
        // Build a chain one level deeper than the cap, bottom-up
        let mut chain = task("Implement level", 1.0);
        for _ in 0..MAX_HIERARCHY_DEPTH {
            let mut parent = task("Implement level", 1.0);
            parent.add_child(chain);
            chain = parent;
        }
        assert_eq!(chain.depth(), MAX_HIERARCHY_DEPTH + 1);

        let err = DependencyGraph::validate(&chain).unwrap_err();
        assert!(matches!(err, TaskGraphError::ComplexityOverflow { .. }));
    }

    #[test]
    fn test_can_start_finish_to_start() {
        let mut dependent = task("Implement consumer", 1.0);
        let prerequisite = task("Implement producer", 1.0);
        dependent
            .add_dependency(prerequisite.id, TaskDependencyKind::FinishToStart, None)
            .expect("edge");
        let prereq_id = prerequisite.id;

        let pending = |id: TaskId| {
            (id == prereq_id).then_some((TaskStatus::Pending, false))
        };
        assert!(!can_start(&dependent, &pending));

        let done = |id: TaskId| {
            (id == prereq_id).then_some((TaskStatus::Completed, true))
        };
        assert!(can_start(&dependent, &done));
    }

    #[test]
    fn test_can_start_start_to_start() {
        let mut dependent = task("Implement consumer", 1.0);
        let prerequisite = task("Implement producer", 1.0);
        dependent
            .add_dependency(prerequisite.id, TaskDependencyKind::StartToStart, None)
            .expect("edge");
        let prereq_id = prerequisite.id;

        let started = |id: TaskId| {
            (id == prereq_id).then_some((TaskStatus::InProgress, true))
        };
        assert!(can_start(&dependent, &started));
    }

    #[test]
    fn test_finish_type_constraints_do_not_block_start() {
        let mut dependent = task("Implement consumer", 1.0);
        let prerequisite = task("Implement producer", 1.0);
        dependent
            .add_dependency(prerequisite.id, TaskDependencyKind::FinishToFinish, None)
            .expect("edge");
        let prereq_id = prerequisite.id;

        let pending = |id: TaskId| {
            (id == prereq_id).then_some((TaskStatus::Pending, false))
        };
        assert!(can_start(&dependent, &pending));
    }
}
