//! Multi-threaded sparse matrix times dense matrix multiplication.
//!
//! Dense operands are packed as `dim`-wide rows, so a dense "vector" of `n`
//! rows holds `n * dim` elements. Every parallel pass splits the *output*
//! buffer into disjoint `&mut` slices, one per segment, so no two threads ever
//! write the same element and no synchronization is needed.

use std::{
    mem,
    ops::{AddAssign, Mul},
};

use rayon::prelude::*;

use crate::{
    error::{Result, TrainErr},
    range::Range,
};

/// The number of segments used when the caller has no preference.
pub const DEFAULT_THREADS: usize = 2;

/// Numeric element a kernel can operate on.
pub trait Element: Copy + Default + PartialEq + AddAssign + Mul<Output = Self> + Send + Sync {}

impl<T> Element for T where T: Copy + Default + PartialEq + AddAssign + Mul<Output = T> + Send + Sync {}

/// A read-only row major sparse matrix view.
///
/// Row `i` owns the nonzeros `offset[i]..offset[i + 1]`, whose columns live in
/// `index` and whose weights live in `value`. When `value` is `None` every
/// nonzero weighs 1.
#[derive(Debug, Clone, Copy)]
pub struct SpMat<'a, V> {
    pub size: usize,
    /// One past the largest column referenced.
    pub cols: usize,
    pub offset: &'a [usize],
    pub index: &'a [u32],
    pub value: Option<&'a [V]>,
}

impl<'a, V> SpMat<'a, V> {
    /// Creates a new `SpMat` view, validating the row layout.
    ///
    /// # Arguments
    /// * `offset` - The `size + 1` monotonic row start array.
    /// * `index` - The column of every nonzero.
    /// * `value` - The optional weight of every nonzero.
    pub fn new(offset: &'a [usize], index: &'a [u32], value: Option<&'a [V]>) -> Result<Self> {
        let Some(&nnz) = offset.last() else {
            return Err(TrainErr::SizeMismatch {
                expected: 1,
                got: 0,
            });
        };

        if index.len() != nnz {
            return Err(TrainErr::SizeMismatch {
                expected: nnz,
                got: index.len(),
            });
        }

        if let Some(value) = value {
            if value.len() != nnz {
                return Err(TrainErr::SizeMismatch {
                    expected: nnz,
                    got: value.len(),
                });
            }
        }

        let cols = index.iter().max().map_or(0, |&c| c as usize + 1);

        Ok(Self {
            size: offset.len() - 1,
            cols,
            offset,
            index,
            value,
        })
    }

    #[inline]
    fn row(&self, i: usize) -> std::ops::Range<usize> {
        self.offset[i]..self.offset[i + 1]
    }
}

/// Computes `y = D * x`.
///
/// Rows of `D` are split in `threads` segments and every segment writes only
/// its own rows of `y`.
///
/// # Arguments
/// * `d` - An `n * m` sparse matrix.
/// * `x` - An `m * dim` dense matrix.
/// * `y` - The `n * dim` output, pre-allocated by the caller.
/// * `dim` - The width of every dense row.
/// * `threads` - The amount of segments to compute in parallel.
///
/// # Returns
/// A `SizeMismatch` if `y` isn't `n * dim` long, or if `x` isn't made of
/// `dim`-wide rows covering every column of `D`. An empty `x` is a no-op.
pub fn times<V: Element>(
    d: &SpMat<'_, V>,
    x: &[V],
    y: &mut [V],
    dim: usize,
    threads: usize,
) -> Result<()> {
    if x.is_empty() {
        return Ok(());
    }

    check_len(y.len(), d.size * dim)?;
    check_covers(x.len(), d.cols, dim)?;
    y.fill(V::default());

    let parts = split_rows(y, Range::new(0, d.size), dim, threads);

    parts.into_par_iter().for_each(|(rg, y)| {
        for i in rg.begin..rg.end {
            let row = d.row(i);
            if row.is_empty() {
                continue;
            }

            let y_i = &mut y[(i - rg.begin) * dim..][..dim];

            match d.value {
                Some(value) => {
                    for j in row {
                        let x_j = &x[d.index[j] as usize * dim..][..dim];
                        let v = value[j];
                        y_i.iter_mut().zip(x_j).for_each(|(yk, &xk)| *yk += xk * v);
                    }
                }
                None => {
                    for j in row {
                        let x_j = &x[d.index[j] as usize * dim..][..dim];
                        y_i.iter_mut().zip(x_j).for_each(|(yk, &xk)| *yk += xk);
                    }
                }
            }
        }
    });

    Ok(())
}

/// Computes `y = D^T * x + p * z`, or plain `y = D^T * x` if `z` is `None` or `p` is zero.
///
/// Many rows of `D` scatter into the same row of `y`, so instead of splitting
/// the rows of `D` the output rows are split in `threads` segments. Every
/// segment scans the whole of `D` and only accumulates the nonzeros whose
/// column falls inside the rows it owns.
///
/// # Arguments
/// * `d` - An `n * m` sparse matrix.
/// * `x` - An `n * dim` dense matrix.
/// * `p` - A scalar for `z`.
/// * `z` - An optional `m * dim` dense matrix.
/// * `y` - The `m * dim` output, pre-allocated by the caller.
/// * `dim` - The width of every dense row.
/// * `threads` - The amount of segments to compute in parallel.
///
/// # Returns
/// A `SizeMismatch` if `x` isn't `n * dim` long, `y` isn't made of `dim`-wide
/// rows covering every column of `D` or `z` isn't as long as `y`. An empty `x`
/// is a no-op.
pub fn trans_times<V: Element>(
    d: &SpMat<'_, V>,
    x: &[V],
    p: V,
    z: Option<&[V]>,
    y: &mut [V],
    dim: usize,
    threads: usize,
) -> Result<()> {
    if x.is_empty() {
        return Ok(());
    }

    // with a non empty `x` this also rules out `dim == 0`
    check_len(x.len(), d.size * dim)?;
    check_covers(y.len(), d.cols, dim)?;

    match z {
        Some(z) if p != V::default() => {
            check_len(z.len(), y.len())?;
            y.iter_mut().zip(z).for_each(|(yi, &zi)| *yi = zi * p);
        }
        _ => y.fill(V::default()),
    }

    let rows = Range::new(0, y.len() / dim);
    let parts = split_rows(y, rows, dim, threads);

    parts.into_par_iter().for_each(|(rg, y)| {
        for i in 0..d.size {
            let row = d.row(i);
            if row.is_empty() {
                continue;
            }

            let x_i = &x[i * dim..][..dim];

            for j in row {
                let e = d.index[j] as usize;
                if !rg.has(e) {
                    continue;
                }

                let y_e = &mut y[(e - rg.begin) * dim..][..dim];
                match d.value {
                    Some(value) => {
                        let v = value[j];
                        y_e.iter_mut().zip(x_i).for_each(|(yk, &xk)| *yk += xk * v);
                    }
                    None => y_e.iter_mut().zip(x_i).for_each(|(yk, &xk)| *yk += xk),
                }
            }
        }
    });

    Ok(())
}

fn check_len(got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(TrainErr::SizeMismatch { expected, got });
    }

    Ok(())
}

/// Checks that `len` elements are whole `dim`-wide rows, at least `cols` of them.
fn check_covers(len: usize, cols: usize, dim: usize) -> Result<()> {
    if dim == 0 || len % dim != 0 || len < cols * dim {
        return Err(TrainErr::SizeMismatch {
            expected: cols * dim,
            got: len,
        });
    }

    Ok(())
}

/// Splits `y` into one disjoint mutable slice per segment of `rows`.
fn split_rows<V>(y: &mut [V], rows: Range, dim: usize, threads: usize) -> Vec<(Range, &mut [V])> {
    let n = threads.max(1);
    let mut parts = Vec::with_capacity(n);
    let mut rest = y;

    for i in 0..n {
        let rg = rows.segment(i, n);
        let (head, tail) = mem::take(&mut rest).split_at_mut(rg.len() * dim);
        parts.push((rg, head));
        rest = tail;
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    // row0: (col0, 2), (col2, 1); row1: (col1, 3)
    const OFFSET: [usize; 3] = [0, 2, 3];
    const INDEX: [u32; 3] = [0, 2, 1];
    const VALUE: [f32; 3] = [2., 1., 3.];

    fn small() -> SpMat<'static, f32> {
        SpMat::new(&OFFSET, &INDEX, Some(&VALUE)).unwrap()
    }

    #[test]
    fn times_small_scenario() {
        let mut y = [0.; 2];
        times(&small(), &[1., 1., 1.], &mut y, 1, 4).unwrap();
        assert_eq!(y, [3., 3.]);
    }

    #[test]
    fn trans_times_small_scenario() {
        let mut y = [0.; 3];
        trans_times(&small(), &[1., 1.], 0., None, &mut y, 1, 4).unwrap();
        assert_eq!(y, [2., 3., 1.]);
    }

    #[test]
    fn trans_times_adds_scaled_z() {
        let mut y = [0.; 3];
        let z = [1., 2., 3.];
        trans_times(&small(), &[1., 1.], 0.5, Some(&z), &mut y, 1, 2).unwrap();
        assert_eq!(y, [2.5, 4., 2.5]);
    }

    #[test]
    fn zero_p_ignores_z() {
        let mut y = [9.; 3];
        let z = [1., 2., 3.];
        trans_times(&small(), &[1., 1.], 0., Some(&z), &mut y, 1, 2).unwrap();
        assert_eq!(y, [2., 3., 1.]);
    }

    #[test]
    fn missing_values_weigh_one() {
        let d = SpMat::<i32>::new(&OFFSET, &INDEX, None).unwrap();
        let mut y = [0; 2];
        times(&d, &[1, 10, 100], &mut y, 1, 1).unwrap();
        assert_eq!(y, [101, 10]);
    }

    #[test]
    fn wide_rows() {
        let d = small();
        // x holds 3 rows of width 2
        let x = [1., 2., 3., 4., 5., 6.];
        let mut y = [0.; 4];
        times(&d, &x, &mut y, 2, 3).unwrap();
        assert_eq!(y, [2. + 5., 4. + 6., 9., 12.]);
    }

    #[test]
    fn empty_x_is_noop() {
        let mut y = [7.; 2];
        times(&small(), &[], &mut y, 1, 2).unwrap();
        assert_eq!(y, [7., 7.]);

        let mut y = [7.; 3];
        trans_times(&small(), &[], 0., None, &mut y, 1, 2).unwrap();
        assert_eq!(y, [7., 7., 7.]);
    }

    #[test]
    fn wrong_output_size_is_rejected() {
        let mut y = [0.; 3];
        let err = times(&small(), &[1., 1., 1.], &mut y, 1, 2).unwrap_err();
        assert!(matches!(err, TrainErr::SizeMismatch { expected: 2, got: 3 }));
    }

    #[test]
    fn short_x_is_rejected() {
        let mut y = [0.; 2];
        let err = times(&small(), &[1., 1.], &mut y, 1, 2).unwrap_err();
        assert!(matches!(err, TrainErr::SizeMismatch { expected: 3, got: 2 }));

        // 5 elements aren't whole rows of width 2
        let mut y = [0.; 4];
        let err = times(&small(), &[1.; 5], &mut y, 2, 2).unwrap_err();
        assert!(matches!(err, TrainErr::SizeMismatch { .. }));
    }

    #[test]
    fn short_y_is_rejected() {
        let mut y = [0.; 2];
        let err = trans_times(&small(), &[1., 1.], 0., None, &mut y, 1, 2).unwrap_err();
        assert!(matches!(err, TrainErr::SizeMismatch { expected: 3, got: 2 }));
        assert_eq!(y, [0., 0.]);
    }

    #[test]
    fn wider_operands_are_accepted() {
        // unreferenced trailing columns read and write nothing
        let mut y = [0.; 2];
        times(&small(), &[1., 1., 1., 5.], &mut y, 1, 2).unwrap();
        assert_eq!(y, [3., 3.]);

        let mut y = [0.; 4];
        trans_times(&small(), &[1., 1.], 0., None, &mut y, 1, 2).unwrap();
        assert_eq!(y, [2., 3., 1., 0.]);
    }

    #[test]
    fn cols_follow_the_largest_index() {
        assert_eq!(small().cols, 3);
        assert_eq!(SpMat::<f32>::new(&[0, 0], &[], None).unwrap().cols, 0);
    }

    #[test]
    fn invalid_layout_is_rejected() {
        assert!(SpMat::<f32>::new(&[0, 2], &[1], None).is_err());
        assert!(SpMat::<f32>::new(&[], &[], None).is_err());
        assert!(SpMat::new(&[0, 1], &[1], Some(&[1., 2.])).is_err());
    }

    #[test]
    fn split_rows_covers_output() {
        let mut y = [0u8; 10];
        let parts = split_rows(&mut y, Range::new(0, 5), 2, 3);
        let lens: Vec<_> = parts.iter().map(|(_, s)| s.len()).collect();
        assert_eq!(lens, [4, 4, 2]);
    }
}
