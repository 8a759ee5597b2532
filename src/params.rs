//! Named parameter tensors treated as one vector.
//!
//! [`ParameterSet`] is the dictionary-valued parameter state of a model. The
//! sampler mostly works on the flat vector produced by
//! [`ParameterSet::flatten`]; the [`Layout`] records how to go back.

use std::collections::BTreeMap;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::error::{Result, SamplerError};

/// Position of one named tensor inside the flat parameter vector.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayoutEntry {
    pub name: String,
    pub shape: Vec<usize>,
    pub offset: usize,
}

impl LayoutEntry {
    /// Number of scalar entries in the tensor.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len()
    }
}

/// Names, shapes and offsets of every tensor, sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Layout {
    entries: Vec<LayoutEntry>,
    num_params: usize,
}

impl Layout {
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    /// Total scalar parameter count `P`.
    pub fn num_params(&self) -> usize {
        self.num_params
    }

    pub fn entry(&self, name: &str) -> Option<&LayoutEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// Ordered map from parameter name to tensor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSet {
    tensors: BTreeMap<String, ArrayD<f64>>,
}

impl FromIterator<(String, ArrayD<f64>)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f64>)>>(iter: I) -> Self {
        ParameterSet {
            tensors: iter.into_iter().collect(),
        }
    }
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tensor, returning the previous one under that name.
    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f64>) -> Option<ArrayD<f64>> {
        self.tensors.insert(name.into(), tensor)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, tensor: ArrayD<f64>) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.tensors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f64>)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of named tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total scalar parameter count `P`.
    pub fn num_params(&self) -> usize {
        self.tensors.values().map(ArrayD::len).sum()
    }

    pub fn layout(&self) -> Layout {
        let mut offset = 0;
        let entries = self
            .tensors
            .iter()
            .map(|(name, t)| {
                let entry = LayoutEntry {
                    name: name.clone(),
                    shape: t.shape().to_vec(),
                    offset,
                };
                offset += t.len();
                entry
            })
            .collect();
        Layout {
            entries,
            num_params: offset,
        }
    }

    /// Concatenate every tensor in name order, each in row-major order.
    pub fn flatten(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.num_params());
        for t in self.tensors.values() {
            flat.extend(t.iter().copied());
        }
        flat
    }

    /// Inverse of [`flatten`](Self::flatten).
    pub fn from_flat(layout: &Layout, values: &[f64]) -> Result<Self> {
        if values.len() != layout.num_params() {
            return Err(SamplerError::ShapeMismatch(format!(
                "flat vector has {} entries, layout expects {}",
                values.len(),
                layout.num_params()
            )));
        }
        layout
            .entries()
            .iter()
            .map(|e| {
                let t = ArrayD::from_shape_vec(IxDyn(&e.shape), values[e.range()].to_vec())
                    .map_err(|err| SamplerError::ShapeMismatch(format!("{}: {err}", e.name)))?;
                Ok((e.name.clone(), t))
            })
            .collect()
    }

    /// Zero tensors with the same names and shapes.
    pub fn zeros_like(&self) -> Self {
        self.tensors
            .iter()
            .map(|(k, v)| (k.clone(), ArrayD::zeros(v.raw_dim())))
            .collect()
    }

    /// Check that `self` matches `layout` name-for-name and shape-for-shape.
    pub fn check_layout(&self, layout: &Layout) -> Result<()> {
        if self.len() != layout.entries().len() {
            return Err(SamplerError::ShapeMismatch(format!(
                "expected {} tensors, found {}",
                layout.entries().len(),
                self.len()
            )));
        }
        for (entry, (name, t)) in layout.entries().iter().zip(self.tensors.iter()) {
            if entry.name != *name {
                return Err(SamplerError::ShapeMismatch(format!(
                    "expected tensor `{}`, found `{name}`",
                    entry.name
                )));
            }
            if entry.shape != t.shape() {
                return Err(SamplerError::ShapeMismatch(format!(
                    "tensor `{name}` has shape {:?}, expected {:?}",
                    t.shape(),
                    entry.shape
                )));
            }
        }
        Ok(())
    }

    pub fn check_compatible(&self, other: &ParameterSet) -> Result<()> {
        other.check_layout(&self.layout())
    }

    fn zip_with(&self, other: &ParameterSet, f: impl Fn(f64, f64) -> f64) -> Result<Self> {
        self.check_compatible(other)?;
        Ok(self
            .tensors
            .iter()
            .zip(other.tensors.values())
            .map(|((k, a), b)| {
                let mut out = a.clone();
                out.zip_mut_with(b, |x, &y| *x = f(*x, y));
                (k.clone(), out)
            })
            .collect())
    }

    pub fn add(&self, other: &ParameterSet) -> Result<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &ParameterSet) -> Result<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn scale(&self, alpha: f64) -> Self {
        self.tensors
            .iter()
            .map(|(k, v)| (k.clone(), v * alpha))
            .collect()
    }

    pub fn dot(&self, other: &ParameterSet) -> Result<f64> {
        self.check_compatible(other)?;
        Ok(self
            .tensors
            .values()
            .zip(other.tensors.values())
            .map(|(a, b)| a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f64>())
            .sum())
    }

    /// Euclidean norm over all entries.
    pub fn norm(&self) -> f64 {
        self.tensors
            .values()
            .flat_map(|t| t.iter())
            .map(|x| x * x)
            .sum::<f64>()
            .sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.tensors
            .values()
            .all(|t| t.iter().all(|x| x.is_finite()))
    }

    /// Stack sets of identical layout along a new leading sample axis.
    pub fn stack(samples: &[ParameterSet]) -> Result<Self> {
        let first = samples
            .first()
            .ok_or_else(|| SamplerError::ShapeMismatch("cannot stack zero samples".into()))?;
        for s in &samples[1..] {
            first.check_compatible(s)?;
        }
        first
            .tensors
            .keys()
            .map(|name| {
                let views: Vec<ArrayViewD<'_, f64>> =
                    samples.iter().map(|s| s.tensors[name].view()).collect();
                let stacked = ndarray::stack(Axis(0), &views)
                    .map_err(|err| SamplerError::ShapeMismatch(format!("{name}: {err}")))?;
                Ok((name.clone(), stacked))
            })
            .collect()
    }

    /// Split along the leading sample axis. Inverse of [`stack`](Self::stack).
    pub fn unstack(&self) -> Result<Vec<Self>> {
        let mut n = None;
        for (name, t) in &self.tensors {
            let lead = t.shape().first().copied().ok_or_else(|| {
                SamplerError::ShapeMismatch(format!("tensor `{name}` has no sample axis"))
            })?;
            match n {
                None => n = Some(lead),
                Some(m) if m != lead => {
                    return Err(SamplerError::ShapeMismatch(format!(
                        "tensor `{name}` has {lead} samples, expected {m}"
                    )))
                }
                Some(_) => {}
            }
        }
        Ok((0..n.unwrap_or(0))
            .map(|i| {
                self.tensors
                    .iter()
                    .map(|(k, t)| (k.clone(), t.index_axis(Axis(0), i).to_owned()))
                    .collect()
            })
            .collect())
    }

    /// blake3 digest of names, shapes and the bit pattern of every value.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (name, t) in &self.tensors {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            for &d in t.shape() {
                hasher.update(&(d as u64).to_le_bytes());
            }
            for x in t.iter() {
                hasher.update(&x.to_bits().to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Read-only view of a flat parameter vector through a [`Layout`].
///
/// This is what losses and models receive, with `T` being `f64`, a dual
/// number or a tape variable depending on the pass.
#[derive(Clone, Copy, Debug)]
pub struct ParamView<'a, T> {
    layout: &'a Layout,
    values: &'a [T],
}

impl<'a, T> ParamView<'a, T> {
    pub fn new(layout: &'a Layout, values: &'a [T]) -> Self {
        debug_assert_eq!(layout.num_params(), values.len());
        ParamView { layout, values }
    }

    pub fn layout(&self) -> &'a Layout {
        self.layout
    }

    pub fn flat(&self) -> &'a [T] {
        self.values
    }

    /// Entries of the tensor `name` in row-major order.
    pub fn get_slice(&self, name: &str) -> Option<&'a [T]> {
        self.layout.entry(name).map(|e| &self.values[e.range()])
    }

    pub fn get(&self, name: &str) -> Option<ArrayViewD<'a, T>> {
        let entry = self.layout.entry(name)?;
        ArrayViewD::from_shape(IxDyn(&entry.shape), &self.values[entry.range()]).ok()
    }

    /// # Panics
    ///
    /// Panics if there is no tensor called `name`.
    pub fn slice(&self, name: &str) -> &'a [T] {
        match self.get_slice(name) {
            Some(s) => s,
            None => panic!("no parameter tensor named `{name}`"),
        }
    }

    /// # Panics
    ///
    /// Panics if there is no tensor called `name`.
    pub fn tensor(&self, name: &str) -> ArrayViewD<'a, T> {
        match self.get(name) {
            Some(t) => t,
            None => panic!("no parameter tensor named `{name}`"),
        }
    }
}

impl<T: Copy> ParamView<'_, T> {
    /// The single entry of a one-element tensor.
    ///
    /// # Panics
    ///
    /// Panics if `name` is missing or holds more than one entry.
    pub fn scalar(&self, name: &str) -> T {
        match self.slice(name) {
            [x] => *x,
            s => panic!("parameter `{name}` has {} entries, expected 1", s.len()),
        }
    }
}
