//! A loss frozen at reference parameters, differentiated over a whole batch.
//!
//! The per-example loss is mapped over the batch axis so that one forward pass
//! gives `J·v` and one reverse sweep gives `Jᵗ·w`, where `J` is the `B × P`
//! Jacobian of per-example losses. `J` itself is only materialised by
//! [`BatchedLoss::jacobian`], which the curvature operator needs.

use nalgebra::DMatrix;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::api::{grad, jvp, vjp};
use crate::data::Minibatch;
use crate::loss::Loss;
use crate::params::{Layout, ParamView, ParameterSet};
use crate::scalar::Scalar;

/// Evaluate every example of `batch` at `params`.
fn map_batch<L: Loss, T: Scalar<Float = f64>>(
    loss: &L,
    layout: &Layout,
    params: &[T],
    batch: &Minibatch,
) -> Vec<T> {
    let view = ParamView::new(layout, params);
    (0..batch.len())
        .map(|i| {
            let (x, y) = batch.example(i);
            loss.loss(&view, x, y)
        })
        .collect()
}

/// Loss linearised around a fixed parameter point.
pub struct BatchedLoss<'a, L> {
    loss: &'a L,
    layout: Layout,
    params: Vec<f64>,
}

impl<'a, L: Loss> BatchedLoss<'a, L> {
    pub fn new(loss: &'a L, params: &ParameterSet) -> Self {
        BatchedLoss {
            loss,
            layout: params.layout(),
            params: params.flatten(),
        }
    }

    pub fn loss(&self) -> &'a L {
        self.loss
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Reference parameters, flattened.
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Per-example losses at the reference point.
    pub fn losses(&self, batch: &Minibatch) -> Vec<f64> {
        map_batch(self.loss, &self.layout, &self.params, batch)
    }

    /// Gradient of one example's loss: row `i` of `J`.
    pub fn example_gradient(&self, batch: &Minibatch, i: usize) -> Vec<f64> {
        let (x, y) = batch.example(i);
        grad(
            |p| {
                let view = ParamView::new(&self.layout, p);
                self.loss.loss(&view, x.view(), y.view())
            },
            &self.params,
        )
    }

    /// The dense `B × P` Jacobian, one reverse sweep per example.
    pub fn jacobian(&self, batch: &Minibatch) -> DMatrix<f64> {
        let b = batch.len();

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<f64>> = (0..b)
            .into_par_iter()
            .map(|i| self.example_gradient(batch, i))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<f64>> = (0..b).map(|i| self.example_gradient(batch, i)).collect();

        DMatrix::from_row_iterator(b, self.layout.num_params(), rows.into_iter().flatten())
    }

    /// `J·v` with a single forward pass over the batch.
    ///
    /// # Panics
    ///
    /// Panics if `v.len()` differs from the parameter count.
    pub fn jvp(&self, batch: &Minibatch, v: &[f64]) -> Vec<f64> {
        let (_, jv) = jvp(
            |p| map_batch(self.loss, &self.layout, p, batch),
            &self.params,
            v,
        );
        jv
    }

    /// `Jᵗ·w` with a single reverse sweep seeded by `w` on the `B` outputs.
    ///
    /// # Panics
    ///
    /// Panics if `w.len()` differs from the batch size.
    pub fn vjp(&self, batch: &Minibatch, w: &[f64]) -> Vec<f64> {
        let (_, jtw) = vjp(
            |p| map_batch(self.loss, &self.layout, p, batch),
            &self.params,
            w,
        );
        jtw
    }
}
