//! Dense rank-1/2/3 `f32` arrays that either own their elements or view a buffer arena.

pub mod ops;

use std::fmt;
use std::ops::{Add, Mul};

use anyhow::{bail, ensure, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::arena::{ArenaView, WORD_BYTES};
use crate::error::{EngineError, EngineResult};

/// Type tag recorded for every buffer item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayKind {
    Vector,
    Matrix,
    Array3,
}

impl ArrayKind {
    pub fn rank(self) -> usize {
        match self {
            ArrayKind::Vector => 1,
            ArrayKind::Matrix => 2,
            ArrayKind::Array3 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArrayKind::Vector => "vector",
            ArrayKind::Matrix => "matrix",
            ArrayKind::Array3 => "array3",
        }
    }
}

impl fmt::Display for ArrayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an array's elements live.
#[derive(Debug)]
pub enum ArrayStorage {
    Owned(Vec<f32>),
    /// Shallow view into a buffer arena. The view keeps the arena alive.
    View(ArenaView),
}

/// Row-major dense array of rank `R`.
///
/// Matrices use `[rows, cols]`, rank-3 arrays `[depth, rows, cols]`. Cloning always produces an
/// owned deep copy, even when `self` is a view.
pub struct Array<const R: usize> {
    shape: [usize; R],
    storage: ArrayStorage,
}

pub type Vector = Array<1>;
pub type Matrix = Array<2>;
pub type Array3 = Array<3>;

impl<const R: usize> Array<R> {
    fn from_parts(shape: [usize; R], data: Vec<f32>) -> Result<Self> {
        let expected = shape.iter().product::<usize>();
        ensure!(
            data.len() == expected,
            "array data length ({}) does not match shape {:?}",
            data.len(),
            shape
        );
        Ok(Self {
            shape,
            storage: ArrayStorage::Owned(data),
        })
    }

    fn zeroed(shape: [usize; R]) -> Self {
        let len = shape.iter().product::<usize>();
        Self {
            shape,
            storage: ArrayStorage::Owned(vec![0.0; len]),
        }
    }

    pub fn shape(&self) -> [usize; R] {
        self.shape
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_view(&self) -> bool {
        matches!(self.storage, ArrayStorage::View(_))
    }

    pub fn storage(&self) -> &ArrayStorage {
        &self.storage
    }

    /// Bytes occupied by the serialized form: one header word per axis plus one word per element.
    pub fn serialized_size(&self) -> usize {
        WORD_BYTES * (R + self.len())
    }

    pub fn with_data<T>(&self, f: impl FnOnce(&[f32]) -> T) -> T {
        match &self.storage {
            ArrayStorage::Owned(data) => f(data),
            ArrayStorage::View(view) => view.with(f),
        }
    }

    pub fn with_data_mut<T>(&mut self, f: impl FnOnce(&mut [f32]) -> T) -> T {
        match &mut self.storage {
            ArrayStorage::Owned(data) => f(data),
            ArrayStorage::View(view) => view.with_mut(f),
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.with_data(|data| data.to_vec())
    }

    pub fn fill(&mut self, value: f32) {
        self.with_data_mut(|data| data.fill(value));
    }

    pub fn zero(&mut self) {
        self.fill(0.0);
    }

    fn rebind(&mut self, view: ArenaView) -> EngineResult<()> {
        check_view_len(&self.shape, &view)?;
        self.storage = ArrayStorage::View(view);
        Ok(())
    }

    fn from_view_dims(dims: &[usize], view: ArenaView) -> EngineResult<Self> {
        let shape: [usize; R] = dims.try_into().map_err(|_| {
            EngineError::shape_mismatch(
                "view",
                format!("expected {R} dimensions, got {}", dims.len()),
            )
        })?;
        check_view_len(&shape, &view)?;
        Ok(Self {
            shape,
            storage: ArrayStorage::View(view),
        })
    }
}

impl Vector {
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self {
            shape: [data.len()],
            storage: ArrayStorage::Owned(data),
        }
    }

    pub fn zeros(len: usize) -> Self {
        Self::zeroed([len])
    }

    /// Samples from `N(0, std^2)`.
    pub fn randn(len: usize, std: f32, rng: &mut impl Rng) -> Self {
        Self::from_vec(sample_normal(len, std, rng))
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Vector::from_vec(data)
    }
}

impl Matrix {
    /// Builds a matrix from row slices, rejecting ragged input.
    pub fn from_rows<Row: AsRef<[f32]>>(rows: &[Row]) -> Result<Self> {
        let cols = rows.first().map(|row| row.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                bail!(
                    "matrix row {idx} has {} columns, expected {cols}",
                    row.len()
                );
            }
            data.extend_from_slice(row);
        }
        Self::from_parts([rows.len(), cols], data)
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        Self::from_parts([rows, cols], data)
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::zeroed([rows, cols])
    }

    pub fn randn(rows: usize, cols: usize, std: f32, rng: &mut impl Rng) -> Self {
        Self {
            shape: [rows, cols],
            storage: ArrayStorage::Owned(sample_normal(rows * cols, std, rng)),
        }
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn cols(&self) -> usize {
        self.shape[1]
    }

    pub fn row(&self, index: usize) -> Vec<f32> {
        let cols = self.cols();
        self.with_data(|data| data[index * cols..(index + 1) * cols].to_vec())
    }
}

impl Array3 {
    pub fn from_vec(depth: usize, rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        Self::from_parts([depth, rows, cols], data)
    }

    pub fn zeros(depth: usize, rows: usize, cols: usize) -> Self {
        Self::zeroed([depth, rows, cols])
    }

    pub fn randn(depth: usize, rows: usize, cols: usize, std: f32, rng: &mut impl Rng) -> Self {
        Self {
            shape: [depth, rows, cols],
            storage: ArrayStorage::Owned(sample_normal(depth * rows * cols, std, rng)),
        }
    }
}

impl<const R: usize> Clone for Array<R> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            storage: ArrayStorage::Owned(self.to_vec()),
        }
    }
}

impl<const R: usize> PartialEq for Array<R> {
    fn eq(&self, other: &Self) -> bool {
        if self.shape != other.shape {
            return false;
        }
        // Copy one side first so two views of the same arena never hold the lock together.
        let lhs = self.to_vec();
        other.with_data(|rhs| lhs.as_slice() == rhs)
    }
}

impl<const R: usize> fmt::Debug for Array<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("shape", &self.shape)
            .field("view", &self.is_view())
            .field("data", &self.to_vec())
            .finish()
    }
}

impl<const R: usize> fmt::Display for Array<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.to_vec();
        let row_len = self.shape.last().copied().unwrap_or(0);
        if R <= 1 || row_len == 0 {
            return write_row(f, &data);
        }
        for (idx, row) in data.chunks(row_len).enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write_row(f, row)?;
        }
        Ok(())
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, values: &[f32]) -> fmt::Result {
    f.write_str("[")?;
    for value in values {
        write!(f, " {value}")?;
    }
    f.write_str(" ]")
}

impl Mul<f32> for &Vector {
    type Output = Vector;

    fn mul(self, factor: f32) -> Vector {
        let mut out = vec![0.0; self.len()];
        self.with_data(|src| ops::scale(src, factor, &mut out));
        Vector::from_vec(out)
    }
}

impl Add<&Vector> for &Vector {
    type Output = Vector;

    fn add(self, rhs: &Vector) -> Vector {
        assert_eq!(
            self.shape, rhs.shape,
            "vector length mismatch: {:?} vs {:?}",
            self.shape, rhs.shape
        );
        let lhs = self.to_vec();
        let mut out = vec![0.0; lhs.len()];
        rhs.with_data(|rhs| ops::add(&lhs, rhs, &mut out));
        Vector::from_vec(out)
    }
}

impl Mul<&Vector> for &Matrix {
    type Output = Vector;

    fn mul(self, rhs: &Vector) -> Vector {
        assert_eq!(
            self.cols(),
            rhs.len(),
            "matrix has {} columns but vector has {} elements",
            self.cols(),
            rhs.len()
        );
        let matrix = self.to_vec();
        let mut out = vec![0.0; self.rows()];
        rhs.with_data(|vector| ops::matvec(&matrix, self.rows(), self.cols(), vector, &mut out));
        Vector::from_vec(out)
    }
}

fn check_view_len(shape: &[usize], view: &ArenaView) -> EngineResult<()> {
    let len = shape.iter().product::<usize>();
    if view.len() != len {
        return Err(EngineError::shape_mismatch(
            "bind",
            format!(
                "view of {} elements cannot back an array of shape {:?}",
                view.len(),
                shape
            ),
        ));
    }
    Ok(())
}

/// Box-Muller sampling of `len` values from `N(0, std^2)`.
fn sample_normal(len: usize, std: f32, rng: &mut impl Rng) -> Vec<f32> {
    let mut values = Vec::with_capacity(len);
    while values.len() < len {
        let u1: f32 = rng.gen::<f32>().max(f32::MIN_POSITIVE);
        let u2: f32 = rng.gen::<f32>();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f32::consts::PI * u2;
        values.push(r * theta.cos() * std);
        if values.len() < len {
            values.push(r * theta.sin() * std);
        }
    }
    values
}

/// Encodes a shape into header words, failing when an extent does not fit in `u32`.
pub fn encode_header(dims: &[usize]) -> EngineResult<Vec<u32>> {
    dims.iter()
        .map(|&dim| {
            u32::try_from(dim).map_err(|_| {
                EngineError::shape_mismatch("insert", format!("dimension {dim} exceeds u32 range"))
            })
        })
        .collect()
}

pub fn decode_header(words: &[u32]) -> Vec<usize> {
    words.iter().map(|&word| word as usize).collect()
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Array<1> {}
    impl Sealed for super::Array<2> {}
    impl Sealed for super::Array<3> {}
}

/// Arrays that can be stored in a buffer.
///
/// Implemented for `Vector`, `Matrix` and `Array3` only.
pub trait NumericArray: sealed::Sealed + Sized {
    const KIND: ArrayKind;

    fn dims(&self) -> Vec<usize>;

    fn element_count(&self) -> usize;

    fn copy_elements(&self) -> Vec<f32>;

    /// Turns the array into a shallow view over `view`. The element count must match.
    fn bind_view(&mut self, view: ArenaView) -> EngineResult<()>;

    /// Reconstructs a shallow view array from stored dimensions.
    fn from_view(dims: &[usize], view: ArenaView) -> EngineResult<Self>;
}

macro_rules! impl_numeric_array {
    ($($rank:literal => $kind:expr),* $(,)?) => {
        $(
            impl NumericArray for Array<$rank> {
                const KIND: ArrayKind = $kind;

                fn dims(&self) -> Vec<usize> {
                    self.shape.to_vec()
                }

                fn element_count(&self) -> usize {
                    self.len()
                }

                fn copy_elements(&self) -> Vec<f32> {
                    self.to_vec()
                }

                fn bind_view(&mut self, view: ArenaView) -> EngineResult<()> {
                    self.rebind(view)
                }

                fn from_view(dims: &[usize], view: ArenaView) -> EngineResult<Self> {
                    Self::from_view_dims(dims, view)
                }
            }
        )*
    };
}

impl_numeric_array!(
    1 => ArrayKind::Vector,
    2 => ArrayKind::Matrix,
    3 => ArrayKind::Array3,
);
