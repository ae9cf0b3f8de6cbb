//! Tarjan strongly-connected components over the per-unit call graph.
//!
//! Components come out callee-first (reverse topological order of the
//! condensation), which is exactly the order the interprocedural propagator
//! wants: a function's callees have stable summaries before the function
//! itself is processed, and recursion is isolated to multi-node (or
//! self-looping) components that get bounded fixed-point iteration.

use super::{CallGraph, NodeId};

struct TarjanState<'g> {
    graph: &'g CallGraph,
    index: usize,
    indices: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<NodeId>,
    components: Vec<Vec<NodeId>>,
}

/// Computes SCCs of the call graph, callee-first.
pub fn strongly_connected_components(graph: &CallGraph) -> Vec<Vec<NodeId>> {
    let n = graph.nodes.len();
    let mut state = TarjanState {
        graph,
        index: 0,
        indices: vec![None; n],
        lowlink: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        components: Vec::new(),
    };
    for v in 0..n {
        if state.indices[v].is_none() {
            strong_connect(&mut state, v);
        }
    }
    state.components
}

fn strong_connect(state: &mut TarjanState<'_>, v: NodeId) {
    state.indices[v] = Some(state.index);
    state.lowlink[v] = state.index;
    state.index += 1;
    state.stack.push(v);
    state.on_stack[v] = true;

    let callees = state.graph.callees(v).to_vec();
    for w in callees {
        match state.indices[w] {
            None => {
                strong_connect(state, w);
                state.lowlink[v] = state.lowlink[v].min(state.lowlink[w]);
            }
            Some(w_index) if state.on_stack[w] => {
                state.lowlink[v] = state.lowlink[v].min(w_index);
            }
            Some(_) => {}
        }
    }

    if state.lowlink[v] == state.indices[v].expect("visited") {
        let mut component = Vec::new();
        loop {
            let w = state.stack.pop().expect("stack invariant");
            state.on_stack[w] = false;
            component.push(w);
            if w == v {
                break;
            }
        }
        state.components.push(component);
    }
}

/// Whether a component is cyclic: more than one member, or a single member
/// with a self edge.
pub fn is_cyclic(graph: &CallGraph, component: &[NodeId]) -> bool {
    component.len() > 1
        || component
            .first()
            .map(|&v| graph.callees(v).contains(&v))
            .unwrap_or(false)
}
