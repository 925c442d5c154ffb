//! Operator nodes and the three validation passes dispatched over them.
//!
//! Each node runs pre-validate (structural checks on the attribute record),
//! infer (fill missing tensor properties from context and inputs), then
//! post-validate (all referenced tensors fully resolved and coherent).

use crate::attributes::{
    ConvDGradAttr, ConvFPropAttr, ConvWGradAttr, MatmulAttr, PointwiseAttr, TensorId,
};
use crate::error::{Error, Result};
use crate::layout;

use super::arena::TensorArena;
use super::context::Context;

/// Tagged operator node. Dispatch over this enum replaces the virtual
/// pre/infer/post hooks a class hierarchy would use.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    ConvFProp(ConvFPropAttr),
    ConvDGrad(ConvDGradAttr),
    ConvWGrad(ConvWGradAttr),
    Pointwise(PointwiseAttr),
    Matmul(MatmulAttr),
}

impl Node {
    pub(crate) fn name(&self) -> &str {
        match self {
            Node::ConvFProp(attr) => &attr.name,
            Node::ConvDGrad(attr) => &attr.name,
            Node::ConvWGrad(attr) => &attr.name,
            Node::Pointwise(attr) => &attr.name,
            Node::Matmul(attr) => &attr.name,
        }
    }

    pub(crate) fn pre_validate(&self, arena: &TensorArena) -> Result<()> {
        log::debug!("pre-validating node '{}'", self.name());
        match self {
            Node::ConvFProp(attr) => {
                let x = required(attr.x, &attr.name, "X")?;
                required(attr.w, &attr.name, "W")?;
                required(attr.y, &attr.name, "Y")?;
                pre_validate_conv_geometry(
                    &attr.name,
                    &attr.padding,
                    &attr.stride,
                    &attr.dilation,
                    arena.get(x).dim().len(),
                )
            }
            Node::ConvDGrad(attr) => {
                let dy = required(attr.dy, &attr.name, "DY")?;
                required(attr.w, &attr.name, "W")?;
                required(attr.dx, &attr.name, "DX")?;
                pre_validate_conv_geometry(
                    &attr.name,
                    &attr.padding,
                    &attr.stride,
                    &attr.dilation,
                    arena.get(dy).dim().len(),
                )
            }
            Node::ConvWGrad(attr) => {
                let dy = required(attr.dy, &attr.name, "DY")?;
                required(attr.x, &attr.name, "X")?;
                required(attr.dw, &attr.name, "DW")?;
                pre_validate_conv_geometry(
                    &attr.name,
                    &attr.padding,
                    &attr.stride,
                    &attr.dilation,
                    arena.get(dy).dim().len(),
                )
            }
            Node::Pointwise(attr) => {
                if attr.mode.is_none() {
                    return Err(Error::attribute_not_set(format!(
                        "pointwise node '{}' has no mode set",
                        attr.name
                    )));
                }
                let in0 = required(attr.in0, &attr.name, "IN_0")?;
                let in1 = required(attr.in1, &attr.name, "IN_1")?;
                required(attr.out, &attr.name, "OUT_0")?;
                layout::broadcast_dims(arena.get(in0).dim(), arena.get(in1).dim()).map_err(
                    |err| {
                        Error::invalid_attribute(format!(
                            "pointwise node '{}': {}",
                            attr.name,
                            err.message()
                        ))
                    },
                )?;
                Ok(())
            }
            Node::Matmul(attr) => {
                let a = required(attr.a, &attr.name, "A")?;
                let b = required(attr.b, &attr.name, "B")?;
                required(attr.c, &attr.name, "C")?;
                let a_dim = arena.get(a).dim();
                let b_dim = arena.get(b).dim();
                if a_dim.len() < 2 || b_dim.len() < 2 {
                    return Err(Error::invalid_attribute(format!(
                        "matmul node '{}' requires rank >= 2 operands, got {:?} and {:?}",
                        attr.name, a_dim, b_dim
                    )));
                }
                if a_dim[a_dim.len() - 1] != b_dim[b_dim.len() - 2] {
                    return Err(Error::invalid_attribute(format!(
                        "matmul node '{}' inner dimensions differ: {:?} vs {:?}",
                        attr.name, a_dim, b_dim
                    )));
                }
                Ok(())
            }
        }
    }

    pub(crate) fn infer(&self, arena: &mut TensorArena, ctx: &Context) -> Result<()> {
        log::debug!("inferring properties for node '{}'", self.name());
        match self {
            Node::ConvFProp(attr) => {
                let (x, w, y) = (
                    attr.x.expect("pre-validated"),
                    attr.w.expect("pre-validated"),
                    attr.y.expect("pre-validated"),
                );
                resolve_input(arena, ctx, x);
                resolve_input(arena, ctx, w);
                conv_group_count(arena, &attr.name, x, w)?;
                if arena.get(y).dim().is_empty() {
                    let inferred = conv_output_dims(
                        arena.get(x).dim(),
                        arena.get(w).dim(),
                        &attr.padding,
                        &attr.stride,
                        &attr.dilation,
                    )?;
                    arena.get_mut(y).set_dim(inferred);
                }
                resolve_output(arena, ctx, y, x)
            }
            Node::ConvDGrad(attr) => {
                let (dy, w, dx) = (
                    attr.dy.expect("pre-validated"),
                    attr.w.expect("pre-validated"),
                    attr.dx.expect("pre-validated"),
                );
                resolve_input(arena, ctx, dy);
                resolve_input(arena, ctx, w);
                if arena.get(dx).dim().is_empty() {
                    return Err(Error::attribute_not_set(format!(
                        "conv dgrad node '{}' requires DX dims to be set explicitly",
                        attr.name
                    )));
                }
                conv_group_count(arena, &attr.name, dx, w)?;
                resolve_output(arena, ctx, dx, dy)
            }
            Node::ConvWGrad(attr) => {
                let (dy, x, dw) = (
                    attr.dy.expect("pre-validated"),
                    attr.x.expect("pre-validated"),
                    attr.dw.expect("pre-validated"),
                );
                resolve_input(arena, ctx, dy);
                resolve_input(arena, ctx, x);
                if arena.get(dw).dim().is_empty() {
                    return Err(Error::attribute_not_set(format!(
                        "conv wgrad node '{}' requires DW dims to be set explicitly",
                        attr.name
                    )));
                }
                conv_group_count(arena, &attr.name, x, dw)?;
                resolve_output(arena, ctx, dw, dy)
            }
            Node::Pointwise(attr) => {
                let (in0, in1, out) = (
                    attr.in0.expect("pre-validated"),
                    attr.in1.expect("pre-validated"),
                    attr.out.expect("pre-validated"),
                );
                resolve_input(arena, ctx, in0);
                resolve_input(arena, ctx, in1);
                if arena.get(out).dim().is_empty() {
                    let dims = layout::broadcast_dims(arena.get(in0).dim(), arena.get(in1).dim())?;
                    arena.get_mut(out).set_dim(dims);
                }
                resolve_output(arena, ctx, out, in0)
            }
            Node::Matmul(attr) => {
                let (a, b, c) = (
                    attr.a.expect("pre-validated"),
                    attr.b.expect("pre-validated"),
                    attr.c.expect("pre-validated"),
                );
                resolve_input(arena, ctx, a);
                resolve_input(arena, ctx, b);
                if arena.get(c).dim().is_empty() {
                    let dims = matmul_output_dims(&attr.name, arena.get(a).dim(), arena.get(b).dim())?;
                    arena.get_mut(c).set_dim(dims);
                }
                resolve_output(arena, ctx, c, a)
            }
        }
    }

    pub(crate) fn post_validate(&self, arena: &TensorArena) -> Result<()> {
        log::debug!("post-validating node '{}'", self.name());
        for id in self.tensor_ids() {
            arena.get(id).validate()?;
        }
        match self {
            Node::ConvFProp(attr) => {
                let x = arena.get(attr.x.expect("pre-validated"));
                let w = arena.get(attr.w.expect("pre-validated"));
                let y = arena.get(attr.y.expect("pre-validated"));
                if y.dim()[0] != x.dim()[0] || y.dim()[1] != w.dim()[0] {
                    return Err(Error::invalid_attribute(format!(
                        "conv fprop node '{}' output dims {:?} disagree with X {:?} / W {:?}",
                        attr.name,
                        y.dim(),
                        x.dim(),
                        w.dim()
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Every tensor this node references, inputs before outputs.
    pub(crate) fn tensor_ids(&self) -> Vec<TensorId> {
        let slots = match self {
            Node::ConvFProp(attr) => [attr.x, attr.w, attr.y],
            Node::ConvDGrad(attr) => [attr.dy, attr.w, attr.dx],
            Node::ConvWGrad(attr) => [attr.dy, attr.x, attr.dw],
            Node::Pointwise(attr) => [attr.in0, attr.in1, attr.out],
            Node::Matmul(attr) => [attr.a, attr.b, attr.c],
        };
        slots.into_iter().flatten().collect()
    }

    pub(crate) fn output_id(&self) -> Option<TensorId> {
        match self {
            Node::ConvFProp(attr) => attr.y,
            Node::ConvDGrad(attr) => attr.dx,
            Node::ConvWGrad(attr) => attr.dw,
            Node::Pointwise(attr) => attr.out,
            Node::Matmul(attr) => attr.c,
        }
    }
}

fn required(slot: Option<TensorId>, node: &str, port: &str) -> Result<TensorId> {
    slot.ok_or_else(|| {
        Error::attribute_not_set(format!("node '{node}' is missing its {port} tensor"))
    })
}

fn pre_validate_conv_geometry(
    name: &str,
    padding: &[i64],
    stride: &[i64],
    dilation: &[i64],
    image_rank: usize,
) -> Result<()> {
    if image_rank < 3 {
        return Err(Error::invalid_attribute(format!(
            "conv node '{name}' requires a rank >= 3 image tensor, got rank {image_rank}"
        )));
    }
    let spatial = image_rank - 2;
    for (label, values) in [("stride", stride), ("padding", padding), ("dilation", dilation)] {
        if values.len() != spatial {
            return Err(Error::invalid_attribute(format!(
                "conv node '{name}' {label} has rank {} but the image has {spatial} spatial dims",
                values.len()
            )));
        }
    }
    if stride.iter().any(|&v| v < 1) || dilation.iter().any(|&v| v < 1) {
        return Err(Error::invalid_attribute(format!(
            "conv node '{name}' stride and dilation values must be >= 1"
        )));
    }
    if padding.iter().any(|&v| v < 0) {
        return Err(Error::invalid_attribute(format!(
            "conv node '{name}' padding values must be >= 0"
        )));
    }
    Ok(())
}

/// `floor((x + 2p - d(w - 1) - 1) / s) + 1` per spatial axis, with batch
/// from the image and channels from the filter's output count.
fn conv_output_dims(
    x_dim: &[i64],
    w_dim: &[i64],
    padding: &[i64],
    stride: &[i64],
    dilation: &[i64],
) -> Result<Vec<i64>> {
    let mut out = Vec::with_capacity(x_dim.len());
    out.push(x_dim[0]);
    out.push(w_dim[0]);
    for axis in 0..x_dim.len() - 2 {
        let x = x_dim[axis + 2];
        let w = w_dim[axis + 2];
        let extent =
            (x + 2 * padding[axis] - dilation[axis] * (w - 1) - 1) / stride[axis] + 1;
        if extent <= 0 {
            return Err(Error::shape_inference(format!(
                "conv output extent collapsed to {extent} on spatial axis {axis}"
            )));
        }
        out.push(extent);
    }
    Ok(out)
}

fn matmul_output_dims(name: &str, a_dim: &[i64], b_dim: &[i64]) -> Result<Vec<i64>> {
    let batch_a = &a_dim[..a_dim.len() - 2];
    let batch_b = &b_dim[..b_dim.len() - 2];
    let mut out = if batch_a.len() == batch_b.len() {
        layout::broadcast_dims(batch_a, batch_b).map_err(|err| {
            Error::invalid_attribute(format!("matmul node '{name}': {}", err.message()))
        })?
    } else if batch_b.is_empty() {
        batch_a.to_vec()
    } else {
        return Err(Error::invalid_attribute(format!(
            "matmul node '{name}' has incompatible batch dims {batch_a:?} vs {batch_b:?}"
        )));
    };
    out.push(a_dim[a_dim.len() - 2]);
    out.push(b_dim[b_dim.len() - 1]);
    Ok(out)
}

/// Derived group count `channels(X) / channels(W)`; must divide evenly.
fn conv_group_count(
    arena: &TensorArena,
    name: &str,
    image: TensorId,
    filter: TensorId,
) -> Result<i64> {
    let channels = arena.get(image).dim()[1];
    let filter_channels = arena.get(filter).dim()[1];
    if filter_channels <= 0 || channels % filter_channels != 0 {
        return Err(Error::invalid_attribute(format!(
            "conv node '{name}': image channels {channels} not divisible by filter channels {filter_channels}"
        )));
    }
    Ok(channels / filter_channels)
}

/// Derived group count for the emitter, assuming a validated graph.
pub(crate) fn group_count(channels: i64, filter_channels: i64) -> i64 {
    channels / filter_channels
}

/// Fills an unset dtype and missing strides on an input tensor.
fn resolve_input(arena: &mut TensorArena, ctx: &Context, id: TensorId) {
    let tensor = arena.get_mut(id);
    if !tensor.data_type().is_set() {
        tensor.set_data_type(ctx.default_data_type(tensor.is_virtual()));
    }
    if tensor.stride().is_empty() && !tensor.dim().is_empty() {
        let contiguous = layout::contiguous_strides(tensor.dim());
        tensor.set_stride(contiguous);
    }
}

/// Fills dtype and strides on an op output. Missing strides take the stride
/// ORDER of `like` (the node's primary input), so channels-last inputs
/// produce channels-last outputs.
fn resolve_output(
    arena: &mut TensorArena,
    ctx: &Context,
    id: TensorId,
    like: TensorId,
) -> Result<()> {
    let like_order = layout::stride_order(arena.get(like).stride());
    let tensor = arena.get_mut(id);
    if !tensor.data_type().is_set() {
        tensor.set_data_type(ctx.default_data_type(tensor.is_virtual()));
    }
    if tensor.stride().is_empty() {
        if tensor.dim().is_empty() {
            return Err(Error::shape_inference(format!(
                "tensor '{}' has neither dims nor strides after inference",
                tensor.name()
            )));
        }
        let stride = if like_order.len() == tensor.dim().len() {
            layout::strides_for_order(tensor.dim(), &like_order)
        } else {
            layout::contiguous_strides(tensor.dim())
        };
        tensor.set_stride(stride);
    }
    Ok(())
}
