//! Stride-order bookkeeping shared by inference and the emitter.
//!
//! Tensors carry a logical `dim` plus a physical `stride`. All layout
//! reasoning reduces to one permutation: the order of axes by decreasing
//! stride. `NCHW` data is the identity order; `NHWC` data is `[0, 2, 3, 1]`.

use crate::error::{Error, Result};

/// Axis indices sorted by decreasing stride (stable on ties). This is the
/// permutation from physical (outermost-first) positions to logical axes.
pub fn stride_order(stride: &[i64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..stride.len()).collect();
    order.sort_by(|&a, &b| stride[b].cmp(&stride[a]));
    order
}

/// Inverse of a permutation.
pub fn invert_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0usize; perm.len()];
    for (position, &axis) in perm.iter().enumerate() {
        inverse[axis] = position;
    }
    inverse
}

/// Logical dims rearranged into decreasing-stride order. This is the shape
/// the downstream dialect sees, which assumes channels-first memory even
/// when the logical layout is channels-last.
pub fn physical_dims(dim: &[i64], stride: &[i64]) -> Vec<i64> {
    stride_order(stride).iter().map(|&axis| dim[axis]).collect()
}

/// Row-major (contiguous, channels-first) strides for `dim`.
pub fn contiguous_strides(dim: &[i64]) -> Vec<i64> {
    strides_for_order(dim, &(0..dim.len()).collect::<Vec<_>>())
}

/// Channels-last axis order for the given rank: batch outermost, then the
/// spatial axes, with channels innermost (`[0, 2, 3, 1]` for rank 4).
pub fn channels_last_order(rank: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(rank);
    order.push(0);
    order.extend(2..rank);
    if rank > 1 {
        order.push(1);
    }
    order
}

/// Dense strides realizing `order` (axes listed outermost to innermost).
pub fn strides_for_order(dim: &[i64], order: &[usize]) -> Vec<i64> {
    debug_assert_eq!(dim.len(), order.len());
    let mut stride = vec![0i64; dim.len()];
    let mut running = 1i64;
    for &axis in order.iter().rev() {
        stride[axis] = running;
        running *= dim[axis];
    }
    stride
}

/// Checks that `stride` describes a dense permuted layout of `dim`: every
/// stride positive, and walking axes innermost-out each stride equals the
/// product of the faster-varying extents.
pub fn validate_dense_layout(name: &str, dim: &[i64], stride: &[i64]) -> Result<()> {
    if dim.len() != stride.len() {
        return Err(Error::invalid_attribute(format!(
            "tensor '{name}' has rank-{} dim but rank-{} stride",
            dim.len(),
            stride.len()
        )));
    }
    if let Some(bad) = stride.iter().find(|&&s| s <= 0) {
        return Err(Error::invalid_attribute(format!(
            "tensor '{name}' has non-positive stride {bad}"
        )));
    }
    let order = stride_order(stride);
    let mut expected = 1i64;
    for &axis in order.iter().rev() {
        if stride[axis] != expected {
            return Err(Error::invalid_attribute(format!(
                "tensor '{name}' strides {stride:?} do not describe a dense layout of dims {dim:?}"
            )));
        }
        expected *= dim[axis];
    }
    Ok(())
}

/// Element-wise broadcast of two equal-rank shapes; a size-1 extent
/// broadcasts against any extent on the other side.
pub fn broadcast_dims(lhs: &[i64], rhs: &[i64]) -> Result<Vec<i64>> {
    if lhs.len() != rhs.len() {
        return Err(Error::invalid_attribute(format!(
            "cannot broadcast shapes of different rank: {lhs:?} vs {rhs:?}"
        )));
    }
    lhs.iter()
        .zip(rhs.iter())
        .map(|(&a, &b)| {
            if a == b || b == 1 {
                Ok(a)
            } else if a == 1 {
                Ok(b)
            } else {
                Err(Error::invalid_attribute(format!(
                    "cannot broadcast shapes {lhs:?} and {rhs:?}"
                )))
            }
        })
        .collect()
}
