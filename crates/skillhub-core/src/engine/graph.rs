//! Workflow graph: validation and scheduling queries.

use crate::error::ProtocolError;
use crate::models::{Workflow, WorkflowNode};
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
pub struct WorkflowGraph {
    nodes: HashMap<String, WorkflowNode>,
    adjacency: HashMap<String, Vec<String>>,
    reverse: HashMap<String, Vec<String>>,
    in_degree: HashMap<String, usize>,
}

impl WorkflowGraph {
    /// Build the graph, rejecting duplicate node ids and edges that name
    /// undeclared nodes.
    pub fn from_workflow(workflow: &Workflow) -> Result<Self, ProtocolError> {
        let mut nodes = HashMap::new();
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
        let mut in_degree: HashMap<String, usize> = HashMap::new();

        if workflow.nodes.is_empty() {
            return Err(ProtocolError::InvalidWorkflow(
                "workflow declares no nodes".to_string(),
            ));
        }

        for node in &workflow.nodes {
            if nodes.insert(node.node_id.clone(), node.clone()).is_some() {
                return Err(ProtocolError::InvalidWorkflow(format!(
                    "duplicate node id {:?}",
                    node.node_id
                )));
            }
            adjacency.insert(node.node_id.clone(), Vec::new());
            reverse.insert(node.node_id.clone(), Vec::new());
            in_degree.insert(node.node_id.clone(), 0);
        }

        for edge in &workflow.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !nodes.contains_key(endpoint) {
                    return Err(ProtocolError::InvalidWorkflow(format!(
                        "edge {} -> {} references undeclared node {:?}",
                        edge.from, edge.to, endpoint
                    )));
                }
            }
            adjacency
                .get_mut(&edge.from)
                .expect("endpoint checked")
                .push(edge.to.clone());
            reverse
                .get_mut(&edge.to)
                .expect("endpoint checked")
                .push(edge.from.clone());
            *in_degree.get_mut(&edge.to).expect("endpoint checked") += 1;
        }

        Ok(Self {
            nodes,
            adjacency,
            reverse,
            in_degree,
        })
    }

    /// DFS with grey/black coloring; returns the offending path on a cycle.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Grey,
            Black,
        }

        fn visit(
            node: &str,
            colors: &mut HashMap<String, Color>,
            path: &mut Vec<String>,
            adjacency: &HashMap<String, Vec<String>>,
        ) -> bool {
            colors.insert(node.to_string(), Color::Grey);
            path.push(node.to_string());

            for next in adjacency.get(node).map(Vec::as_slice).unwrap_or_default() {
                match colors.get(next).copied().unwrap_or(Color::White) {
                    Color::Grey => {
                        path.push(next.clone());
                        return true;
                    }
                    Color::White => {
                        if visit(next, colors, path, adjacency) {
                            return true;
                        }
                    }
                    Color::Black => {}
                }
            }

            colors.insert(node.to_string(), Color::Black);
            path.pop();
            false
        }

        let mut colors: HashMap<String, Color> = HashMap::new();
        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();

        for id in ids {
            if colors.get(id.as_str()).copied().unwrap_or(Color::White) == Color::White {
                let mut path = Vec::new();
                if visit(id, &mut colors, &mut path, &self.adjacency) {
                    // Trim to the cycle itself.
                    let repeated = path.last().expect("non-empty on cycle").clone();
                    let start = path.iter().position(|n| *n == repeated).unwrap_or(0);
                    return Some(path[start..].to_vec());
                }
            }
        }
        None
    }

    /// Nodes transitively upstream of `node_id`.
    pub fn upstream_of(&self, node_id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&String> = self
            .reverse
            .get(node_id)
            .map(|parents| parents.iter().collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if seen.insert(current.clone()) {
                if let Some(parents) = self.reverse.get(current) {
                    stack.extend(parents.iter());
                }
            }
        }
        seen
    }

    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(node_id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn dependents(&self, node_id: &str) -> &[String] {
        self.adjacency
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Starting in-degree per node; the orchestrator decrements its copy as
    /// nodes complete.
    pub fn in_degrees(&self) -> HashMap<String, usize> {
        self.in_degree.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Edge;
    use serde_json::json;

    fn node(id: &str) -> WorkflowNode {
        WorkflowNode {
            node_id: id.to_string(),
            skill_id: format!("skill_{id}"),
            inputs: json!({}),
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn workflow(nodes: Vec<WorkflowNode>, edges: Vec<Edge>) -> Workflow {
        Workflow {
            workflow_id: "wf".to_string(),
            nodes,
            edges,
            global_inputs: json!({}),
            timeout_seconds: None,
        }
    }

    #[test]
    fn diamond_graph_builds_with_correct_degrees() {
        let wf = workflow(
            vec![node("a"), node("b"), node("c"), node("d")],
            vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        );
        let graph = WorkflowGraph::from_workflow(&wf).unwrap();

        let degrees = graph.in_degrees();
        assert_eq!(degrees["a"], 0);
        assert_eq!(degrees["b"], 1);
        assert_eq!(degrees["d"], 2);
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn unknown_edge_endpoint_is_invalid() {
        let wf = workflow(vec![node("a")], vec![edge("a", "ghost")]);
        let err = WorkflowGraph::from_workflow(&wf).unwrap_err();
        assert_eq!(err.code(), "SKILL_ORC_001");
    }

    #[test]
    fn duplicate_node_ids_are_invalid() {
        let wf = workflow(vec![node("a"), node("a")], vec![]);
        let err = WorkflowGraph::from_workflow(&wf).unwrap_err();
        assert_eq!(err.code(), "SKILL_ORC_001");
    }

    #[test]
    fn empty_workflow_is_invalid() {
        let wf = workflow(vec![], vec![]);
        assert!(WorkflowGraph::from_workflow(&wf).is_err());
    }

    #[test]
    fn two_node_cycle_is_found() {
        let wf = workflow(
            vec![node("a"), node("b")],
            vec![edge("a", "b"), edge("b", "a")],
        );
        let graph = WorkflowGraph::from_workflow(&wf).unwrap();
        let cycle = graph.find_cycle().unwrap();
        assert!(cycle.len() >= 3);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let wf = workflow(vec![node("a")], vec![edge("a", "a")]);
        let graph = WorkflowGraph::from_workflow(&wf).unwrap();
        assert!(graph.find_cycle().is_some());
    }

    #[test]
    fn longer_cycle_behind_a_chain_is_found() {
        let wf = workflow(
            vec![node("a"), node("b"), node("c"), node("d")],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "d"), edge("d", "b")],
        );
        let graph = WorkflowGraph::from_workflow(&wf).unwrap();
        let cycle = graph.find_cycle().unwrap();
        assert!(cycle.contains(&"b".to_string()));
        assert!(cycle.contains(&"d".to_string()));
    }

    #[test]
    fn upstream_is_transitive() {
        let wf = workflow(
            vec![node("a"), node("b"), node("c"), node("d")],
            vec![edge("a", "b"), edge("b", "c"), edge("a", "d")],
        );
        let graph = WorkflowGraph::from_workflow(&wf).unwrap();

        let upstream = graph.upstream_of("c");
        assert!(upstream.contains("a"));
        assert!(upstream.contains("b"));
        assert!(!upstream.contains("d"));
        assert!(graph.upstream_of("a").is_empty());
    }
}
