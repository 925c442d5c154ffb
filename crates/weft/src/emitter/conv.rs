//! Emission of convolution forward, data-gradient and weight-gradient nodes.

use std::fmt::Write as _;

use crate::attributes::{ConvDGradAttr, ConvFPropAttr, ConvWGradAttr};
use crate::error::Result;
use crate::graph::{group_count, Graph};

use super::{
    emit_input_permute, emit_int_list, emit_output_permute, value_type_logical,
};

/// Constants shared by every convolution flavor: no fused bias, not a
/// transposed convolution, empty output padding, the derived group count,
/// and the stride/padding/dilation integer lists.
fn emit_common_prolog(
    out: &mut String,
    op: &str,
    groups: i64,
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
) {
    let _ = writeln!(out, "    %bias_{op} = torch.constant.none");
    let _ = writeln!(out, "    %transposed_{op} = torch.constant.bool false");
    let _ = writeln!(
        out,
        "    %output_padding_{op} = torch.prim.ListConstruct  : () -> !torch.list<int>"
    );
    let _ = writeln!(out, "    %groups_{op} = torch.constant.int {groups}");
    emit_int_list(out, "stride", op, stride);
    emit_int_list(out, "padding", op, padding);
    emit_int_list(out, "dilation", op, dilation);
}

/// `torch.aten.empty.memory_format` placeholder standing in for the absent
/// primal tensor of a backward convolution.
fn emit_empty_placeholder(
    out: &mut String,
    op: &str,
    label: &str,
    result_ssa: &str,
    graph: &Graph,
    tensor_id: crate::attributes::TensorId,
) -> Result<()> {
    let tensor = graph.arena().get(tensor_id);
    emit_int_list(out, &format!("empty_{label}"), op, tensor.dim());
    let _ = writeln!(out, "    %none_{label}_{op} = torch.constant.none");
    let _ = writeln!(
        out,
        "    %dtype_{label}_{op} = torch.constant.int {}",
        tensor.data_type().torch_type_code()?
    );
    let _ = writeln!(
        out,
        "    {result_ssa} = torch.aten.empty.memory_format %empty_{label}_{op}, %dtype_{label}_{op}, %none_{label}_{op}, %none_{label}_{op}, %none_{label}_{op}, %none_{label}_{op} : !torch.list<int>, !torch.int, !torch.none, !torch.none, !torch.none, !torch.none -> {}",
        value_type_logical(tensor)?
    );
    Ok(())
}

/// Gradient selector list for `torch.aten.convolution_backward`.
fn emit_output_mask(out: &mut String, op: &str, mask: [bool; 3]) {
    let _ = writeln!(out, "    %true_{op} = torch.constant.bool true");
    let _ = writeln!(out, "    %false_{op} = torch.constant.bool false");
    let operands: Vec<String> = mask
        .iter()
        .map(|&selected| {
            if selected {
                format!("%true_{op}")
            } else {
                format!("%false_{op}")
            }
        })
        .collect();
    let _ = writeln!(
        out,
        "    %output_mask_{op} = torch.prim.ListConstruct {} : (!torch.bool, !torch.bool, !torch.bool) -> !torch.list<bool>",
        operands.join(", ")
    );
}

pub(super) fn emit_fprop(out: &mut String, graph: &Graph, attr: &ConvFPropAttr) -> Result<()> {
    let op = attr.name();
    let x = graph.arena().get(attr.x().expect("validated fprop missing X"));
    let w = graph.arena().get(attr.w().expect("validated fprop missing W"));
    let y = graph.arena().get(attr.y().expect("validated fprop missing Y"));
    let groups = group_count(x.dim()[1], w.dim()[1]);

    emit_common_prolog(out, op, groups, attr.stride(), attr.padding(), attr.dilation());

    let x_perm = format!("%{}_perm", x.name());
    let w_perm = format!("%{}_perm", w.name());
    emit_input_permute(out, "permute_X", op, &x_perm, x)?;
    emit_input_permute(out, "permute_W", op, &w_perm, w)?;

    let _ = writeln!(
        out,
        "    %{}_perm = torch.aten.convolution {x_perm}, {w_perm}, %bias_{op}, %stride_{op}, %padding_{op}, %dilation_{op}, %transposed_{op}, %output_padding_{op}, %groups_{op} : {}, {}, !torch.none, !torch.list<int>, !torch.list<int>, !torch.list<int>, !torch.bool, !torch.list<int>, !torch.int -> {}",
        y.name(),
        value_type_logical(x)?,
        value_type_logical(w)?,
        value_type_logical(y)?
    );

    emit_output_permute(out, "permute_Y", op, &format!("%{}_perm", y.name()), y)
}

pub(super) fn emit_dgrad(out: &mut String, graph: &Graph, attr: &ConvDGradAttr) -> Result<()> {
    let op = attr.name();
    let dy = graph.arena().get(attr.dy().expect("validated dgrad missing DY"));
    let w = graph.arena().get(attr.w().expect("validated dgrad missing W"));
    let dx_id = attr.dx().expect("validated dgrad missing DX");
    let dx = graph.arena().get(dx_id);
    let groups = group_count(dx.dim()[1], w.dim()[1]);

    emit_common_prolog(out, op, groups, attr.stride(), attr.padding(), attr.dilation());

    let dy_perm = format!("%{}_perm", dy.name());
    let w_perm = format!("%{}_perm", w.name());
    emit_input_permute(out, "permute_DY", op, &dy_perm, dy)?;
    emit_input_permute(out, "permute_W", op, &w_perm, w)?;

    let empty_x = format!("%empty_x_{op}");
    emit_empty_placeholder(out, op, "DX", &empty_x, graph, dx_id)?;
    emit_output_mask(out, op, [true, false, false]);

    let _ = writeln!(
        out,
        "    %{}_perm, %grad_weight_{op}, %grad_bias_{op} = torch.aten.convolution_backward {dy_perm}, {empty_x}, {w_perm}, %bias_{op}, %stride_{op}, %padding_{op}, %dilation_{op}, %transposed_{op}, %output_padding_{op}, %groups_{op}, %output_mask_{op} : {}, {}, {}, !torch.none, !torch.list<int>, !torch.list<int>, !torch.list<int>, !torch.bool, !torch.list<int>, !torch.int, !torch.list<bool> -> {}, !torch.none, !torch.none",
        dx.name(),
        value_type_logical(dy)?,
        value_type_logical(dx)?,
        value_type_logical(w)?,
        value_type_logical(dx)?
    );

    emit_output_permute(out, "permute_DX", op, &format!("%{}_perm", dx.name()), dx)
}

pub(super) fn emit_wgrad(out: &mut String, graph: &Graph, attr: &ConvWGradAttr) -> Result<()> {
    let op = attr.name();
    let dy = graph.arena().get(attr.dy().expect("validated wgrad missing DY"));
    let x = graph.arena().get(attr.x().expect("validated wgrad missing X"));
    let dw_id = attr.dw().expect("validated wgrad missing DW");
    let dw = graph.arena().get(dw_id);
    let groups = group_count(x.dim()[1], dw.dim()[1]);

    emit_common_prolog(out, op, groups, attr.stride(), attr.padding(), attr.dilation());

    let dy_perm = format!("%{}_perm", dy.name());
    let x_perm = format!("%{}_perm", x.name());
    emit_input_permute(out, "permute_DY", op, &dy_perm, dy)?;
    emit_input_permute(out, "permute_X", op, &x_perm, x)?;

    let empty_w = format!("%empty_w_{op}");
    emit_empty_placeholder(out, op, "DW", &empty_w, graph, dw_id)?;
    emit_output_mask(out, op, [false, true, false]);

    let _ = writeln!(
        out,
        "    %grad_input_{op}, %{}_perm, %grad_bias_{op} = torch.aten.convolution_backward {dy_perm}, {x_perm}, {empty_w}, %bias_{op}, %stride_{op}, %padding_{op}, %dilation_{op}, %transposed_{op}, %output_padding_{op}, %groups_{op}, %output_mask_{op} : {}, {}, {}, !torch.none, !torch.list<int>, !torch.list<int>, !torch.list<int>, !torch.bool, !torch.list<int>, !torch.int, !torch.list<bool> -> !torch.none, {}, !torch.none",
        dw.name(),
        value_type_logical(dy)?,
        value_type_logical(x)?,
        value_type_logical(dw)?,
        value_type_logical(dw)?
    );

    emit_output_permute(out, "permute_DW", op, &format!("%{}_perm", dw.name()), dw)
}
