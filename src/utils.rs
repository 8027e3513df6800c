//! Distance and dataset helpers.

use linfa::Dataset;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix1, Ix2, Ix3, Zip};

/// Squared euclidean distance between two points.
///
/// *Panics* if `x` and `y` have different lengths.
pub fn squared_distance<F: Float>(x: &ArrayView1<F>, y: &ArrayView1<F>) -> F {
    assert!(
        x.len() == y.len(),
        "Points should have the same dimension ({} != {})",
        x.len(),
        y.len()
    );
    Zip::from(x)
        .and(y)
        .fold(F::zero(), |acc, &a, &b| acc + (a - b) * (a - b))
}

/// Build a dataset from a (height, width) grid of values.
///
/// Row `i`, column `j` of the grid gives the point of 1-based coordinates `(i + 1, j + 1)`
/// with target `values[[i, j]]`. Points are numbered in row-major order.
pub fn grid_dataset_2d<F: Float>(
    values: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Dataset<F, F, Ix1> {
    let (height, width) = values.dim();
    let mut inputs = Array2::zeros((height * width, 2));
    let mut targets = Array1::zeros(height * width);
    for ((i, j), v) in values.indexed_iter() {
        let p = i * width + j;
        inputs[[p, 0]] = F::cast(i + 1);
        inputs[[p, 1]] = F::cast(j + 1);
        targets[p] = *v;
    }
    Dataset::new(inputs, targets)
}

/// Build a dataset from a (depth, height, width) grid of values.
///
/// Slice `k`, row `i`, column `j` gives the point of 1-based coordinates `(i + 1, j + 1, k + 1)`.
/// Points are numbered slice after slice, each slice in row-major order.
pub fn grid_dataset_3d<F: Float>(
    values: &ArrayBase<impl Data<Elem = F>, Ix3>,
) -> Dataset<F, F, Ix1> {
    let (depth, height, width) = values.dim();
    let n = depth * height * width;
    let mut inputs = Array2::zeros((n, 3));
    let mut targets = Array1::zeros(n);
    for ((k, i, j), v) in values.indexed_iter() {
        let p = k * height * width + i * width + j;
        inputs[[p, 0]] = F::cast(i + 1);
        inputs[[p, 1]] = F::cast(j + 1);
        inputs[[p, 2]] = F::cast(k + 1);
        targets[p] = *v;
    }
    Dataset::new(inputs, targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::Records;
    use ndarray::{array, Array3};

    #[test]
    fn test_squared_distance() {
        let x = array![1., 2., 3.];
        let y = array![0., 0., 1.];
        assert_abs_diff_eq!(9., squared_distance(&x.view(), &y.view()));
    }

    #[test]
    fn test_grid_dataset_2d() {
        let values = array![[1., 2., 3.], [4., 5., 6.]];
        let ds = grid_dataset_2d(&values);
        assert_eq!(6, ds.nsamples());
        assert_eq!(array![2., 3.], ds.records().row(5));
        assert_eq!(array![1., 2.], ds.records().row(1));
        assert_eq!(array![1., 2., 3., 4., 5., 6.], ds.targets());
    }

    #[test]
    fn test_grid_dataset_3d() {
        let mut values = Array3::<f64>::zeros((2, 2, 3));
        values[[1, 0, 2]] = 7.;
        let ds = grid_dataset_3d(&values);
        assert_eq!(12, ds.nsamples());
        assert_eq!(array![1., 3., 2.], ds.records().row(8));
        assert_eq!(7., ds.targets()[8]);
    }
}
