//! Slice-level numeric routines shared by the host arrays and the CPU executor.
//!
//! Callers are responsible for passing slices of matching length; the routines only check this
//! in debug builds.

/// `out[i] = src[i] * factor`
pub fn scale(src: &[f32], factor: f32, out: &mut [f32]) {
    debug_assert_eq!(src.len(), out.len());
    for (dst, &value) in out.iter_mut().zip(src) {
        *dst = value * factor;
    }
}

/// `out[i] = lhs[i] + rhs[i]`
pub fn add(lhs: &[f32], rhs: &[f32], out: &mut [f32]) {
    debug_assert_eq!(lhs.len(), rhs.len());
    debug_assert_eq!(lhs.len(), out.len());
    for ((dst, &a), &b) in out.iter_mut().zip(lhs).zip(rhs) {
        *dst = a + b;
    }
}

pub fn dot(lhs: &[f32], rhs: &[f32]) -> f32 {
    debug_assert_eq!(lhs.len(), rhs.len());
    lhs.iter().zip(rhs).map(|(&a, &b)| a * b).sum()
}

/// Row-major matrix-vector product: `out[r] = sum_c matrix[r * cols + c] * vector[c]`.
pub fn matvec(matrix: &[f32], rows: usize, cols: usize, vector: &[f32], out: &mut [f32]) {
    debug_assert_eq!(matrix.len(), rows * cols);
    debug_assert_eq!(vector.len(), cols);
    debug_assert_eq!(out.len(), rows);
    if cols == 0 {
        out.fill(0.0);
        return;
    }
    for (dst, row) in out.iter_mut().zip(matrix.chunks_exact(cols)) {
        *dst = dot(row, vector);
    }
}
