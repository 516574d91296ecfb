use crate::{error::Result, spmm::SpMat};

/// Global identifier of a sparse feature, and of its model parameter.
pub type FeaId = u64;

/// The floating point type of labels, weights and gradients.
pub type Real = f32;

/// An owned block of rows in compressed sparse row layout.
///
/// Raw batches index features with their global `FeaId`, localized batches
/// with a `u32` position inside the batch's feature id list.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBlock<I> {
    pub label: Vec<Real>,
    pub offset: Vec<usize>,
    pub index: Vec<I>,
    pub value: Option<Vec<Real>>,
}

impl<I> Default for RowBlock<I> {
    fn default() -> Self {
        Self {
            label: Vec::new(),
            offset: vec![0],
            index: Vec::new(),
            value: None,
        }
    }
}

impl<I: Copy> RowBlock<I> {
    /// Creates a new empty `RowBlock`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.label.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.label.is_empty()
    }

    /// Amount of nonzeros.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.index.len()
    }

    /// Appends a row.
    ///
    /// Missing values weigh 1, so mixing rows with and without values keeps
    /// the block consistent.
    ///
    /// # Arguments
    /// * `label` - The row's label.
    /// * `index` - The row's feature indices.
    /// * `value` - The optional weight of every index, as long as `index`.
    pub fn push_row(&mut self, label: Real, index: &[I], value: Option<&[Real]>) {
        if value.is_some() && self.value.is_none() {
            self.value = Some(vec![1.; self.index.len()]);
        }

        if let Some(vals) = &mut self.value {
            match value {
                Some(value) => vals.extend_from_slice(value),
                None => vals.resize(vals.len() + index.len(), 1.),
            }
        }

        self.label.push(label);
        self.index.extend_from_slice(index);
        self.offset.push(self.index.len());
    }

    /// The indices of row `i`.
    pub fn row_index(&self, i: usize) -> &[I] {
        &self.index[self.offset[i]..self.offset[i + 1]]
    }

    /// The values of row `i`, if the block carries values.
    pub fn row_value(&self, i: usize) -> Option<&[Real]> {
        self.value
            .as_deref()
            .map(|vals| &vals[self.offset[i]..self.offset[i + 1]])
    }
}

impl RowBlock<u32> {
    /// Borrows the block as a sparse matrix for the SpMM kernels.
    pub fn as_spmat(&self) -> Result<SpMat<'_, Real>> {
        SpMat::new(&self.offset, &self.index, self.value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_rows_keeps_offsets() {
        let mut blk = RowBlock::<u64>::new();
        blk.push_row(1., &[3, 7], Some(&[0.5, 2.]));
        blk.push_row(-1., &[], None);
        blk.push_row(1., &[9], None);

        assert_eq!(blk.len(), 3);
        assert_eq!(blk.nnz(), 3);
        assert_eq!(blk.offset, [0, 2, 2, 3]);
        assert_eq!(blk.row_index(2), &[9]);
        assert_eq!(blk.row_value(0), Some(&[0.5, 2.][..]));
        assert_eq!(blk.row_value(2), Some(&[1.][..]));
    }

    #[test]
    fn values_backfill_with_ones() {
        let mut blk = RowBlock::<u32>::new();
        blk.push_row(1., &[0, 1], None);
        assert!(blk.value.is_none());

        blk.push_row(1., &[2], Some(&[4.]));
        assert_eq!(blk.value.as_deref(), Some(&[1., 1., 4.][..]));

        let d = blk.as_spmat().unwrap();
        assert_eq!(d.size, 2);
    }
}
