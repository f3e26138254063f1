//! Backward-pass driver: topological ordering of the computation graph.

use super::GraphNode;
use std::collections::HashSet;
use std::rc::Rc;

/// Visits every node reachable from `root` in reverse topological order
/// and calls its `backward`.
///
/// Node identity is the `Rc` data pointer, which is stable for the life of
/// the allocation, so diamonds in the graph are visited exactly once. The
/// traversal is iterative; graph depth is bounded only by model depth, but
/// an explicit stack keeps pathological graphs off the call stack.
pub fn backward(root: Option<Rc<dyn GraphNode>>) {
    let Some(root) = root else { return };

    let mut topo: Vec<Rc<dyn GraphNode>> = Vec::new();
    let mut visited: HashSet<*const ()> = HashSet::new();

    // Post-order DFS with an explicit stack: a node is pushed to `topo`
    // only after all of its parents have been emitted.
    let mut stack: Vec<(Rc<dyn GraphNode>, bool)> = vec![(root, false)];
    while let Some((node, expanded)) = stack.pop() {
        let ptr = Rc::as_ptr(&node) as *const ();
        if expanded {
            topo.push(node);
            continue;
        }
        if !visited.insert(ptr) {
            continue;
        }

        let parents = node.parents();
        stack.push((node, true));
        for parent in parents {
            stack.push((parent, false));
        }
    }

    for node in topo.into_iter().rev() {
        node.backward();
    }
}
