//! Graph nodes and the operations that create them.
//!
//! Each operation records the gradient cells of its operands (and whatever
//! forward data its derivative needs), computes its result eagerly, and
//! returns a new [`Variable`] pointing at the node. `backward` implements
//! the chain rule for that one operation; gradients accumulate so a
//! variable consumed by several operations receives the sum.

use super::{GradCell, GraphNode, Variable};
use crate::tensor::{Cpu, Tensor, TensorElem};
use std::cell::RefCell;
use std::ops::{Add, Mul, Sub};
use std::rc::Rc;

/// Adds `delta` into a gradient cell, initialising it on first write.
fn accumulate<T: TensorElem, const RANK: usize>(
    cell: &GradCell<T, RANK>,
    delta: Tensor<T, RANK, Cpu>,
) {
    let mut slot = cell.borrow_mut();
    match slot.as_mut() {
        Some(grad) => *grad = (&*grad + &delta).unwrap(),
        None => *slot = Some(delta),
    }
}

/// Collects the creator nodes of the given variables; leaves contribute
/// nothing, which is where the backward traversal bottoms out.
fn creators(nodes: &[&Option<Rc<dyn GraphNode>>]) -> Vec<Rc<dyn GraphNode>> {
    nodes.iter().filter_map(|n| (*n).clone()).collect()
}

// --- Add ---

#[derive(Debug)]
struct AddNode<T: TensorElem, const RANK: usize> {
    lhs_grad: GradCell<T, RANK>,
    rhs_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for AddNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // d(x+y)/dx = d(x+y)/dy = 1
            accumulate(&self.lhs_grad, grad.clone());
            accumulate(&self.rhs_grad, grad.clone());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T: TensorElem + 'static, const RANK: usize> Add for Variable<T, RANK> {
    type Output = Variable<T, RANK>;

    fn add(self, rhs: Self) -> Self::Output {
        let data = (&self.data + &rhs.data).unwrap();
        let out_grad: GradCell<T, RANK> = Rc::new(RefCell::new(None));

        let node = Rc::new(AddNode {
            lhs_grad: self.grad.clone(),
            rhs_grad: rhs.grad.clone(),
            out_grad: out_grad.clone(),
            parents: creators(&[&self.node, &rhs.node]),
        });

        Variable {
            data,
            grad: out_grad,
            node: Some(node),
        }
    }
}

// --- Sub ---

#[derive(Debug)]
struct SubNode<T: TensorElem, const RANK: usize> {
    lhs_grad: GradCell<T, RANK>,
    rhs_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for SubNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // d(x-y)/dx = 1, d(x-y)/dy = -1
            accumulate(&self.lhs_grad, grad.clone());
            accumulate(&self.rhs_grad, grad.scale(T::zero() - T::one()));
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T: TensorElem + 'static, const RANK: usize> Sub for Variable<T, RANK> {
    type Output = Variable<T, RANK>;

    fn sub(self, rhs: Self) -> Self::Output {
        let data = (&self.data - &rhs.data).unwrap();
        let out_grad: GradCell<T, RANK> = Rc::new(RefCell::new(None));

        let node = Rc::new(SubNode {
            lhs_grad: self.grad.clone(),
            rhs_grad: rhs.grad.clone(),
            out_grad: out_grad.clone(),
            parents: creators(&[&self.node, &rhs.node]),
        });

        Variable {
            data,
            grad: out_grad,
            node: Some(node),
        }
    }
}

// --- Mul (element-wise) ---

#[derive(Debug)]
struct MulNode<T: TensorElem, const RANK: usize> {
    lhs_data: Tensor<T, RANK, Cpu>,
    rhs_data: Tensor<T, RANK, Cpu>,
    lhs_grad: GradCell<T, RANK>,
    rhs_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for MulNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // d(x*y)/dx = y, d(x*y)/dy = x
            accumulate(&self.lhs_grad, (&self.rhs_data * grad).unwrap());
            accumulate(&self.rhs_grad, (&self.lhs_data * grad).unwrap());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T: TensorElem + 'static, const RANK: usize> Mul for Variable<T, RANK> {
    type Output = Variable<T, RANK>;

    fn mul(self, rhs: Self) -> Self::Output {
        let data = (&self.data * &rhs.data).unwrap();
        let out_grad: GradCell<T, RANK> = Rc::new(RefCell::new(None));

        let node = Rc::new(MulNode {
            lhs_data: self.data.clone(),
            rhs_data: rhs.data.clone(),
            lhs_grad: self.grad.clone(),
            rhs_grad: rhs.grad.clone(),
            out_grad: out_grad.clone(),
            parents: creators(&[&self.node, &rhs.node]),
        });

        Variable {
            data,
            grad: out_grad,
            node: Some(node),
        }
    }
}

// --- MatMul ---

#[derive(Debug)]
struct MatMulNode<T: TensorElem> {
    lhs_data: Tensor<T, 2, Cpu>,
    rhs_data: Tensor<T, 2, Cpu>,
    lhs_grad: GradCell<T, 2>,
    rhs_grad: GradCell<T, 2>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem> GraphNode for MatMulNode<T> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // C = A @ B  =>  dA = g @ B^T,  dB = A^T @ g
            let rhs_t = self.rhs_data.transpose().unwrap();
            accumulate(&self.lhs_grad, grad.matmul(&rhs_t).unwrap());

            let lhs_t = self.lhs_data.transpose().unwrap();
            accumulate(&self.rhs_grad, lhs_t.matmul(grad).unwrap());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- ReLU ---

#[derive(Debug)]
struct ReluNode<T: TensorElem, const RANK: usize> {
    input_data: Tensor<T, RANK, Cpu>,
    input_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for ReluNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // Gradient passes where the input was positive, is cut to zero
            // elsewhere (the derivative at exactly zero is taken as zero).
            let mut masked = grad.clone();
            masked
                .data_mut()
                .iter_mut()
                .zip(self.input_data.data().iter())
                .for_each(|(g, &x)| {
                    if x <= T::zero() {
                        *g = T::zero();
                    }
                });
            accumulate(&self.input_grad, masked);
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Mean (reduce to scalar) ---

#[derive(Debug)]
struct MeanNode<T: TensorElem, const RANK: usize> {
    input_shape: [usize; RANK],
    input_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, 0>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for MeanNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // d(mean(x))/dx_i = 1/n
            let n: usize = self.input_shape.iter().product();
            let g = grad.data()[0] / T::from_usize(n).unwrap();
            accumulate(&self.input_grad, Tensor::filled(g, self.input_shape));
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T: TensorElem + 'static> Variable<T, 2> {
    /// Matrix multiplication between two variables.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the inner dimensions disagree.
    pub fn matmul(&self, rhs: &Self) -> crate::tensor::Result<Self> {
        let data = self.data.matmul(&rhs.data)?;
        let out_grad: GradCell<T, 2> = Rc::new(RefCell::new(None));

        let node = Rc::new(MatMulNode {
            lhs_data: self.data.clone(),
            rhs_data: rhs.data.clone(),
            lhs_grad: self.grad.clone(),
            rhs_grad: rhs.grad.clone(),
            out_grad: out_grad.clone(),
            parents: creators(&[&self.node, &rhs.node]),
        });

        Ok(Variable {
            data,
            grad: out_grad,
            node: Some(node),
        })
    }
}

impl<T: TensorElem + 'static, const RANK: usize> Variable<T, RANK> {
    /// Rectified linear unit, element-wise: `max(0, x)`.
    pub fn relu(&self) -> Self {
        let data = self.data.map(|x| if x > T::zero() { x } else { T::zero() });
        let out_grad: GradCell<T, RANK> = Rc::new(RefCell::new(None));

        let node = Rc::new(ReluNode {
            input_data: self.data.clone(),
            input_grad: self.grad.clone(),
            out_grad: out_grad.clone(),
            parents: creators(&[&self.node]),
        });

        Variable {
            data,
            grad: out_grad,
            node: Some(node),
        }
    }

    /// Mean over all elements, producing a rank-0 variable.
    pub fn mean(&self) -> Variable<T, 0> {
        let n: usize = self.data.shape().iter().product();
        let mut sum = T::zero();
        for &v in self.data.data() {
            sum += v;
        }
        let mean = sum / T::from_usize(n).unwrap();

        let data = Tensor::new(vec![mean], []).unwrap();
        let out_grad: GradCell<T, 0> = Rc::new(RefCell::new(None));

        let node = Rc::new(MeanNode {
            input_shape: *self.data.shape(),
            input_grad: self.grad.clone(),
            out_grad: out_grad.clone(),
            parents: creators(&[&self.node]),
        });

        Variable {
            data,
            grad: out_grad,
            node: Some(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(v: f32) -> Variable<f32, 0> {
        Variable::new(Tensor::new(vec![v], []).unwrap())
    }

    #[test]
    fn test_add_backward() {
        let a = scalar(2.0);
        let b = scalar(3.0);
        let c = a.clone() + b.clone();

        assert_eq!(c.data.data()[0], 5.0);
        c.backward();

        assert_eq!(a.grad.borrow().as_ref().unwrap().data()[0], 1.0);
        assert_eq!(b.grad.borrow().as_ref().unwrap().data()[0], 1.0);
    }

    #[test]
    fn test_sub_backward() {
        let a = scalar(2.0);
        let b = scalar(3.0);
        let c = a.clone() - b.clone();

        assert_eq!(c.data.data()[0], -1.0);
        c.backward();

        assert_eq!(a.grad.borrow().as_ref().unwrap().data()[0], 1.0);
        assert_eq!(b.grad.borrow().as_ref().unwrap().data()[0], -1.0);
    }

    #[test]
    fn test_mul_backward() {
        let a = scalar(2.0);
        let b = scalar(3.0);
        let c = a.clone() * b.clone();

        c.backward();

        assert_eq!(a.grad.borrow().as_ref().unwrap().data()[0], 3.0);
        assert_eq!(b.grad.borrow().as_ref().unwrap().data()[0], 2.0);
    }

    #[test]
    fn test_chain_rule() {
        // y = (a + b) * c with a=2, b=3, c=4
        // dy/da = dy/db = c = 4, dy/dc = a + b = 5
        let a = scalar(2.0);
        let b = scalar(3.0);
        let c = scalar(4.0);

        let y = (a.clone() + b.clone()) * c.clone();
        assert_eq!(y.data.data()[0], 20.0);

        y.backward();

        assert_eq!(a.grad.borrow().as_ref().unwrap().data()[0], 4.0);
        assert_eq!(b.grad.borrow().as_ref().unwrap().data()[0], 4.0);
        assert_eq!(c.grad.borrow().as_ref().unwrap().data()[0], 5.0);
    }

    #[test]
    fn test_gradient_accumulates_on_fanout() {
        // y = x * x: both operands share one grad cell, dy/dx = 2x
        let x = scalar(3.0);
        let y = x.clone() * x.clone();
        y.backward();

        assert_eq!(x.grad.borrow().as_ref().unwrap().data()[0], 6.0);
    }

    #[test]
    fn test_matmul_backward() {
        // C = A @ B, seed dC with ones:
        // dA = 1 @ B^T (row sums of B per column), dB = A^T @ 1
        let a = Variable::new(Tensor::new(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap());
        let b = Variable::new(Tensor::new(vec![5.0, 6.0, 7.0, 8.0], [2, 2]).unwrap());

        let c = a.matmul(&b).unwrap();
        // [1 2] [5 6]   [19 22]
        // [3 4] [7 8] = [43 50]
        assert_eq!(c.data.data(), &[19.0, 22.0, 43.0, 50.0]);

        c.backward();

        // dA = ones @ B^T = [[11, 15], [11, 15]]
        assert_eq!(
            a.grad.borrow().as_ref().unwrap().data(),
            &[11.0, 15.0, 11.0, 15.0]
        );
        // dB = A^T @ ones = [[4, 4], [6, 6]]
        assert_eq!(
            b.grad.borrow().as_ref().unwrap().data(),
            &[4.0, 4.0, 6.0, 6.0]
        );
    }

    #[test]
    fn test_matmul_shape_error() {
        let a = Variable::new(Tensor::<f32, 2>::zeros([2, 3]));
        let b = Variable::new(Tensor::<f32, 2>::zeros([4, 2]));
        assert!(a.matmul(&b).is_err());
    }

    #[test]
    fn test_relu_forward_backward() {
        let x = Variable::new(Tensor::new(vec![-1.0, 0.0, 2.0], [3]).unwrap());
        let y = x.relu();

        assert_eq!(y.data.data(), &[0.0, 0.0, 2.0]);

        y.backward();
        // Gradient flows only where the input was strictly positive.
        assert_eq!(x.grad.borrow().as_ref().unwrap().data(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_mean_backward() {
        let x = Variable::new(Tensor::new(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap());
        let m = x.mean();

        assert_eq!(m.data.data()[0], 2.5);

        m.backward();
        assert_eq!(
            x.grad.borrow().as_ref().unwrap().data(),
            &[0.25, 0.25, 0.25, 0.25]
        );
    }

    #[test]
    fn test_squared_error_composition() {
        // loss = mean((x - t)^2), x = [1, 3], t = [0, 0]
        // loss = (1 + 9) / 2 = 5, dloss/dx = 2(x - t)/n = [1, 3]
        let x = Variable::new(Tensor::new(vec![1.0, 3.0], [2]).unwrap());
        let t = Variable::new(Tensor::new(vec![0.0, 0.0], [2]).unwrap());

        let diff = x.clone() - t;
        let loss = (diff.clone() * diff).mean();

        assert_eq!(loss.data.data()[0], 5.0);

        loss.backward();
        assert_eq!(x.grad.borrow().as_ref().unwrap().data(), &[1.0, 3.0]);
    }
}
