//! Named parameter tensors
//!
//! A `ParamSet` holds the trainable variables of a model in a fixed order.
//! Gradients and optimizer slots use the same type, so elementwise updates
//! are plain zips over two sets of identical layout.

use crate::error::{Error, Result};
use ndarray::{Array2, Zip};
use ndarray_npy::{read_npy, write_npy};
use std::path::Path;

/// Ordered collection of named 2-D tensors
///
/// Biases are stored as `1 x n` rows so every entry shares one array type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    entries: Vec<(String, Array2<f32>)>,
}

impl ParamSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tensor
    pub fn push(&mut self, name: impl Into<String>, value: Array2<f32>) {
        self.entries.push((name.into(), value));
    }

    /// Builder form of [`ParamSet::push`]
    pub fn with(mut self, name: impl Into<String>, value: Array2<f32>) -> Self {
        self.push(name, value);
        self
    }

    /// Number of tensors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the set holds no tensors
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of scalar values
    pub fn num_elements(&self) -> usize {
        self.entries.iter().map(|(_, t)| t.len()).sum()
    }

    /// Tensor at a position
    pub fn tensor(&self, i: usize) -> Option<&Array2<f32>> {
        self.entries.get(i).map(|(_, t)| t)
    }

    /// Tensor by name
    pub fn get(&self, name: &str) -> Option<&Array2<f32>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Tensor names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// `(name, tensor)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array2<f32>)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// Mutable tensors in order
    pub fn tensors_mut(&mut self) -> impl Iterator<Item = &mut Array2<f32>> {
        self.entries.iter_mut().map(|(_, t)| t)
    }

    /// Zero-filled set with the same names and shapes
    pub fn zeros_like(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(n, t)| (n.clone(), Array2::zeros(t.raw_dim())))
                .collect(),
        }
    }

    /// Fail unless `other` has the same names and shapes in the same order
    pub fn check_layout(&self, other: &ParamSet) -> Result<()> {
        if self.len() != other.len() {
            return Err(Error::Execution(format!(
                "parameter count mismatch: {} vs {}",
                self.len(),
                other.len()
            )));
        }
        for ((a_name, a), (b_name, b)) in self.entries.iter().zip(&other.entries) {
            if a_name != b_name || a.shape() != b.shape() {
                return Err(Error::Execution(format!(
                    "parameter mismatch: '{a_name}' {:?} vs '{b_name}' {:?}",
                    a.shape(),
                    b.shape()
                )));
            }
        }
        Ok(())
    }

    /// `self += alpha * other`
    pub fn add_scaled(&mut self, alpha: f32, other: &ParamSet) -> Result<()> {
        self.check_layout(other)?;
        for ((_, a), (_, b)) in self.entries.iter_mut().zip(&other.entries) {
            a.scaled_add(alpha, b);
        }
        Ok(())
    }

    /// Multiply every value by `factor`
    pub fn scale(&mut self, factor: f32) {
        for (_, t) in &mut self.entries {
            t.mapv_inplace(|v| v * factor);
        }
    }

    /// Elementwise mean of sets with identical layout
    pub fn mean(sets: &[ParamSet]) -> Result<ParamSet> {
        let (first, rest) = sets
            .split_first()
            .ok_or_else(|| Error::Execution("cannot average an empty list of parameter sets".into()))?;
        let mut acc = first.clone();
        for set in rest {
            acc.add_scaled(1.0, set)?;
        }
        acc.scale(1.0 / sets.len() as f32);
        Ok(acc)
    }

    /// Global L2 norm over every tensor
    pub fn norm(&self) -> f32 {
        self.entries
            .iter()
            .map(|(_, t)| t.iter().map(|&v| v * v).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }

    /// True when no value is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, t)| t.iter().all(|v| v.is_finite()))
    }

    /// Apply `f(param, other)` elementwise over two sets of identical layout
    pub fn zip_apply<F>(&mut self, other: &ParamSet, mut f: F) -> Result<()>
    where
        F: FnMut(&mut f32, f32),
    {
        self.check_layout(other)?;
        for ((_, a), (_, b)) in self.entries.iter_mut().zip(&other.entries) {
            Zip::from(a).and(b).for_each(|x, &y| f(x, y));
        }
        Ok(())
    }

    /// Write every tensor to `<dir>/<prefix><name>.npy`
    pub fn save_npy(&self, dir: &Path, prefix: &str) -> Result<()> {
        for (name, tensor) in &self.entries {
            write_npy(dir.join(format!("{prefix}{name}.npy")), tensor)?;
        }
        Ok(())
    }

    /// Read tensors written by [`ParamSet::save_npy`]
    pub fn load_npy<S: AsRef<str>>(dir: &Path, prefix: &str, names: &[S]) -> Result<Self> {
        let mut set = Self::new();
        for name in names {
            let name = name.as_ref();
            let path = dir.join(format!("{prefix}{name}.npy"));
            let tensor: Array2<f32> = read_npy(&path).map_err(|e| {
                Error::Data(format!("failed to read parameter {}: {e}", path.display()))
            })?;
            set.push(name, tensor);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn set(a: f32, b: f32) -> ParamSet {
        ParamSet::new()
            .with("w", array![[a, a], [a, a]])
            .with("b", array![[b, b, b]])
    }

    #[test]
    fn test_mean_of_sets() {
        let mean = ParamSet::mean(&[set(1.0, 0.0), set(3.0, 6.0)]).unwrap();
        assert_abs_diff_eq!(mean.get("w").unwrap()[[1, 1]], 2.0);
        assert_abs_diff_eq!(mean.get("b").unwrap()[[0, 2]], 3.0);
    }

    #[test]
    fn test_mean_of_empty_list_fails() {
        assert!(ParamSet::mean(&[]).is_err());
    }

    #[test]
    fn test_layout_mismatch() {
        let a = set(1.0, 1.0);
        let b = ParamSet::new().with("w", array![[1.0]]).with("b", array![[1.0]]);
        let err = a.check_layout(&b).unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn test_norm_and_finite() {
        let mut s = set(1.0, 0.0);
        assert_abs_diff_eq!(s.norm(), 2.0);
        assert!(s.is_finite());
        s.tensors_mut().next().unwrap()[[0, 0]] = f32::NAN;
        assert!(!s.is_finite());
    }

    #[test]
    fn test_zeros_like_keeps_layout() {
        let z = set(4.0, 2.0).zeros_like();
        assert_eq!(z.num_elements(), 7);
        assert_eq!(z.norm(), 0.0);
        assert!(z.check_layout(&set(0.0, 0.0)).is_ok());
    }

    #[test]
    fn test_npy_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let original = set(0.5, -1.5);
        original.save_npy(dir.path(), "param-").unwrap();
        let names: Vec<String> = original.names().map(String::from).collect();
        let loaded = ParamSet::load_npy(dir.path(), "param-", &names).unwrap();
        assert_eq!(original, loaded);
    }
}
