//! Row-major numeric batches exchanged between the embedding provider and the
//! scoring model

use candle_core::{DType, Device, Tensor};
use protscore_core::{Error, Result};

/// A dense `rows x cols` matrix of `f32`, one row per sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Create a matrix from row-major data
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::shape(format!(
                "{} values cannot fill a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// A zero-filled matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from per-row vectors; every row must have the same width
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);

        for (idx, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::shape(format!(
                    "row {} has {} columns, expected {}",
                    idx,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }

        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Borrow a single row
    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        if idx >= self.rows {
            return None;
        }
        let start = idx * self.cols;
        Some(&self.data[start..start + self.cols])
    }

    /// Iterate rows in order
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.rows).map(move |idx| {
            let start = idx * self.cols;
            &self.data[start..start + self.cols]
        })
    }

    /// Row-major backing data
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Append the rows of `other` below this matrix.
    ///
    /// An empty `0x0` matrix adopts the width of the first batch appended to it.
    pub fn append(&mut self, other: Matrix) -> Result<()> {
        if self.rows == 0 && self.cols == 0 {
            *self = other;
            return Ok(());
        }
        if other.rows == 0 {
            return Ok(());
        }
        if other.cols != self.cols {
            return Err(Error::shape(format!(
                "cannot append {} columns to a matrix with {} columns",
                other.cols, self.cols
            )));
        }
        self.rows += other.rows;
        self.data.extend(other.data);
        Ok(())
    }

    /// Copy into a `(rows, cols)` tensor on `device`
    pub fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        Tensor::from_slice(&self.data, (self.rows, self.cols), device)
    }

    /// Copy a rank-2 tensor back into host memory
    pub fn from_tensor(tensor: &Tensor) -> candle_core::Result<Self> {
        let (rows, cols) = tensor.dims2()?;
        let data = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        Ok(Self { rows, cols, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let result = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(Error::Shape(_))));
    }

    #[test]
    fn test_append_adopts_first_width() {
        let mut acc = Matrix::zeros(0, 0);
        acc.append(Matrix::from_rows(vec![vec![1.0, 2.0]]).unwrap())
            .unwrap();
        acc.append(Matrix::from_rows(vec![vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap())
            .unwrap();

        assert_eq!(acc.rows(), 3);
        assert_eq!(acc.row(2), Some(&[5.0, 6.0][..]));
        assert!(acc.append(Matrix::zeros(1, 3)).is_err());
    }

    #[test]
    fn test_tensor_round_trip_keeps_layout() {
        let m = Matrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let t = m.to_tensor(&Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[2, 3]);
        assert_eq!(Matrix::from_tensor(&t).unwrap(), m);
    }

    #[test]
    fn test_zero_width_rows_iterate() {
        let m = Matrix::zeros(2, 0);
        assert_eq!(m.iter_rows().count(), 2);
    }
}
