//! Reverse-mode automatic differentiation.
//!
//! Operations on [`Variable`]s build a dynamic computation graph of
//! reference-counted [`GraphNode`]s. Calling [`Variable::backward`] on the
//! loss seeds a ones gradient and walks the graph in reverse topological
//! order, accumulating gradients into each variable's shared gradient cell.
//!
//! Gradient cells are `Rc<RefCell<...>>`: the graph lives on a single
//! thread by design. Mirrored replicas each own their own graph and
//! exchange plain gradient tensors, never `Variable`s.
//!
//! ```rust
//! use drugresp::tensor::Tensor;
//! use drugresp::autograd::Variable;
//!
//! // d(x * x)/dx at x = 3 is 6
//! let x = Variable::new(Tensor::new(vec![3.0], []).unwrap());
//! let y = x.clone() * x.clone();
//! y.backward();
//!
//! assert_eq!(x.grad.borrow().as_ref().unwrap().data()[0], 6.0);
//! ```

use crate::tensor::{Cpu, Tensor, TensorElem};
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

pub mod engine;
pub mod ops;

/// A gradient cell shared between a variable and the nodes reading or
/// writing it.
pub type GradCell<T, const RANK: usize> = Rc<RefCell<Option<Tensor<T, RANK, Cpu>>>>;

/// An operation in the computation graph.
pub trait GraphNode: Debug {
    /// Propagates the output gradient to this node's operands.
    fn backward(&self);

    /// The nodes that produced this node's operands (empty for ops over
    /// leaf variables only).
    fn parents(&self) -> Vec<Rc<dyn GraphNode>>;
}

/// A tensor tracked by the computation graph.
#[derive(Clone, Debug)]
pub struct Variable<T, const RANK: usize>
where
    T: TensorElem,
{
    /// The value of this variable.
    pub data: Tensor<T, RANK, Cpu>,
    /// Accumulated gradient of the loss with respect to this variable.
    pub grad: GradCell<T, RANK>,
    /// The operation that produced this variable (`None` for leaves).
    pub node: Option<Rc<dyn GraphNode>>,
}

impl<T, const RANK: usize> Variable<T, RANK>
where
    T: TensorElem + 'static,
{
    /// Creates a leaf variable (a model parameter or an input).
    pub fn new(data: Tensor<T, RANK, Cpu>) -> Self {
        Self {
            data,
            grad: Rc::new(RefCell::new(None)),
            node: None,
        }
    }

    /// Creates a variable produced by a graph operation.
    pub fn with_node(data: Tensor<T, RANK, Cpu>, node: Rc<dyn GraphNode>) -> Self {
        Self {
            data,
            grad: Rc::new(RefCell::new(None)),
            node: Some(node),
        }
    }

    /// Runs the backward pass starting from this variable, seeding its
    /// gradient with ones. Typically called on the scalar loss.
    pub fn backward(&self) {
        if self.grad.borrow().is_none() {
            *self.grad.borrow_mut() = Some(Tensor::ones(*self.data.shape()));
        }

        engine::backward(self.node.clone());
    }

    /// Takes the accumulated gradient out of this variable, leaving `None`.
    pub fn take_grad(&self) -> Option<Tensor<T, RANK, Cpu>> {
        self.grad.borrow_mut().take()
    }
}
