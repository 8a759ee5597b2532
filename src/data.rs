//! Minibatches and the ordered data sources the sampler sweeps over.

use std::borrow::Cow;

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::error::{Result, SamplerError};

/// Inputs and targets sharing a leading batch axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Minibatch {
    x: ArrayD<f64>,
    y: ArrayD<f64>,
}

impl Minibatch {
    /// Fails if either array lacks a batch axis, the batch sizes differ, or
    /// the batch is empty.
    pub fn new(x: ArrayD<f64>, y: ArrayD<f64>) -> Result<Self> {
        let (bx, by) = match (x.shape().first(), y.shape().first()) {
            (Some(&bx), Some(&by)) => (bx, by),
            _ => {
                return Err(SamplerError::InvalidBatch(
                    "inputs and targets need a leading batch axis".into(),
                ))
            }
        };
        if bx != by {
            return Err(SamplerError::InvalidBatch(format!(
                "inputs have batch size {bx}, targets {by}"
            )));
        }
        if bx == 0 {
            return Err(SamplerError::InvalidBatch("empty minibatch".into()));
        }
        Ok(Minibatch { x, y })
    }

    /// Batch size `B`.
    pub fn len(&self) -> usize {
        self.x.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn x(&self) -> &ArrayD<f64> {
        &self.x
    }

    pub fn y(&self) -> &ArrayD<f64> {
        &self.y
    }

    /// Example `i` with the batch axis removed.
    pub fn example(&self, i: usize) -> (ArrayViewD<'_, f64>, ArrayViewD<'_, f64>) {
        (
            self.x.index_axis(Axis(0), i),
            self.y.index_axis(Axis(0), i),
        )
    }

    fn hash_into(&self, hasher: &mut blake3::Hasher) {
        for a in [&self.x, &self.y] {
            hasher.update(&(a.ndim() as u64).to_le_bytes());
            for &d in a.shape() {
                hasher.update(&(d as u64).to_le_bytes());
            }
            for v in a.iter() {
                hasher.update(&v.to_bits().to_le_bytes());
            }
        }
    }
}

/// Source of minibatches in a fixed, repeatable order.
///
/// Every call to [`batches`](DataSource::batches) must yield the same
/// sequence: cached pseudo-inverses are matched to batches by position.
pub trait DataSource: Sync {
    fn batches(&self) -> Box<dyn Iterator<Item = Cow<'_, Minibatch>> + '_>;

    /// Stable fingerprint of the content and ordering, folded into the
    /// inverse-cache key.
    fn identity(&self) -> String;
}

/// Minibatches held in memory, iterated in insertion order.
#[derive(Clone, Debug)]
pub struct InMemoryData {
    batches: Vec<Minibatch>,
    identity: String,
}

impl InMemoryData {
    pub fn new(batches: Vec<Minibatch>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(batches.len() as u64).to_le_bytes());
        for b in &batches {
            b.hash_into(&mut hasher);
        }
        let identity = hasher.finalize().to_hex().to_string();
        InMemoryData { batches, identity }
    }

    /// Split `x`/`y` into consecutive batches of `batch_size` along axis 0,
    /// without shuffling. The last batch may be shorter.
    pub fn from_arrays(x: ArrayD<f64>, y: ArrayD<f64>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(SamplerError::InvalidBatch("batch size must be positive".into()));
        }
        // Validates the shared leading axis once for the whole dataset.
        let all = Minibatch::new(x, y)?;
        let batches = all
            .x
            .axis_chunks_iter(Axis(0), batch_size)
            .zip(all.y.axis_chunks_iter(Axis(0), batch_size))
            .map(|(xb, yb)| Minibatch::new(xb.to_owned(), yb.to_owned()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(batches))
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Minibatch> {
        self.batches.get(i)
    }
}

impl DataSource for InMemoryData {
    fn batches(&self) -> Box<dyn Iterator<Item = Cow<'_, Minibatch>> + '_> {
        Box::new(self.batches.iter().map(Cow::Borrowed))
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn column(n: usize) -> ArrayD<f64> {
        Array::from_shape_fn((n, 1), |(i, _)| i as f64).into_dyn()
    }

    #[test]
    fn batch_sizes_must_agree() {
        assert!(Minibatch::new(column(3), column(3)).is_ok());
        assert!(matches!(
            Minibatch::new(column(3), column(2)),
            Err(SamplerError::InvalidBatch(_))
        ));
        assert!(Minibatch::new(column(0), column(0)).is_err());
    }

    #[test]
    fn chunks_keep_order_and_short_tail() {
        let data = InMemoryData::from_arrays(column(7), column(7), 3).unwrap();
        let sizes: Vec<usize> = data.batches().map(|b| b.len()).collect();
        assert_eq!(sizes, [3, 3, 1]);
        let (x, _) = data.get(1).unwrap().example(2);
        assert_eq!(x[[0]], 5.0);
    }

    #[test]
    fn identity_depends_on_order() {
        let a = InMemoryData::from_arrays(column(6), column(6), 3).unwrap();
        let b = InMemoryData::from_arrays(column(6), column(6), 2).unwrap();
        let mut reversed: Vec<Minibatch> = a.batches().map(Cow::into_owned).collect();
        reversed.reverse();
        let c = InMemoryData::new(reversed);
        assert_eq!(
            a.identity(),
            InMemoryData::from_arrays(column(6), column(6), 3)
                .unwrap()
                .identity()
        );
        assert_ne!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }
}
