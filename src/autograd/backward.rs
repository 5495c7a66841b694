//! Backward operation trait and graph traversal

use super::Tensor;
use std::collections::HashSet;
use std::rc::Rc;

/// A recorded forward operation that can push gradients to its inputs
///
/// `backward` reads the gradient accumulated on the operation's output and
/// adds the input gradients. It must not recurse: [`super::backward`] visits
/// every operation exactly once, outputs before inputs.
pub trait BackwardOp {
    /// Propagate the output gradient into the inputs
    fn backward(&self);

    /// Tensors read in the forward pass
    fn inputs(&self) -> Vec<Tensor>;
}

/// Operations reachable from `root`, ordered so inputs come before outputs
pub(crate) fn topological_order(root: &Tensor) -> Vec<Rc<dyn BackwardOp>> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        let Some(op) = node.backward_op() else {
            continue;
        };
        if expanded {
            order.push(op);
            continue;
        }
        if !visited.insert(node.node_id()) {
            continue;
        }
        stack.push((node, true));
        for input in op.inputs() {
            if input.backward_op().is_some() && !visited.contains(&input.node_id()) {
                stack.push((input, false));
            }
        }
    }

    order
}
