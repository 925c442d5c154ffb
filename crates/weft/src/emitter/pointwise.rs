//! Emission of element-wise binary nodes.

use std::fmt::Write as _;

use crate::attributes::{PointwiseAttr, PointwiseMode};
use crate::error::Result;
use crate::graph::Graph;

use super::{emit_input_permute, emit_output_permute, value_type_logical};

pub(super) fn emit(out: &mut String, graph: &Graph, attr: &PointwiseAttr) -> Result<()> {
    let op = attr.name();
    let mode = attr.mode().expect("validated pointwise missing mode");
    let in0 = graph
        .arena()
        .get(attr.in0().expect("validated pointwise missing IN_0"));
    let in1 = graph
        .arena()
        .get(attr.in1().expect("validated pointwise missing IN_1"));
    let result = graph
        .arena()
        .get(attr.out().expect("validated pointwise missing OUT_0"));

    let in0_perm = format!("%{}_in0_{op}_perm", in0.name());
    let in1_perm = format!("%{}_in1_{op}_perm", in1.name());
    emit_input_permute(out, "permute_IN_0", op, &in0_perm, in0)?;
    emit_input_permute(out, "permute_IN_1", op, &in1_perm, in1)?;

    // `add`/`sub` carry the aten alpha scaling operand, pinned to one.
    let aten = match mode {
        PointwiseMode::Add => "add",
        PointwiseMode::Sub => "sub",
        PointwiseMode::Mul => "mul",
        PointwiseMode::Div => "div",
    };
    match mode {
        PointwiseMode::Add | PointwiseMode::Sub => {
            let _ = writeln!(out, "    %alpha_{op} = torch.constant.int 1");
            let _ = writeln!(
                out,
                "    %{}_perm = torch.aten.{aten}.Tensor {in0_perm}, {in1_perm}, %alpha_{op} : {}, {}, !torch.int -> {}",
                result.name(),
                value_type_logical(in0)?,
                value_type_logical(in1)?,
                value_type_logical(result)?
            );
        }
        PointwiseMode::Mul | PointwiseMode::Div => {
            let _ = writeln!(
                out,
                "    %{}_perm = torch.aten.{aten}.Tensor {in0_perm}, {in1_perm} : {}, {} -> {}",
                result.name(),
                value_type_logical(in0)?,
                value_type_logical(in1)?,
                value_type_logical(result)?
            );
        }
    }

    emit_output_permute(
        out,
        "permute_OUT_0",
        op,
        &format!("%{}_perm", result.name()),
        result,
    )
}
