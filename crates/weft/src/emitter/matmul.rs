//! Emission of matrix multiplication nodes.

use std::fmt::Write as _;

use crate::attributes::MatmulAttr;
use crate::error::Result;
use crate::graph::Graph;

use super::{emit_input_permute, emit_output_permute, value_type_logical};

pub(super) fn emit(out: &mut String, graph: &Graph, attr: &MatmulAttr) -> Result<()> {
    let op = attr.name();
    let a = graph.arena().get(attr.a().expect("validated matmul missing A"));
    let b = graph.arena().get(attr.b().expect("validated matmul missing B"));
    let c = graph.arena().get(attr.c().expect("validated matmul missing C"));

    let a_perm = format!("%{}_perm", a.name());
    let b_perm = format!("%{}_perm", b.name());
    emit_input_permute(out, "permute_A", op, &a_perm, a)?;
    emit_input_permute(out, "permute_B", op, &b_perm, b)?;

    let _ = writeln!(
        out,
        "    %{}_perm = torch.aten.matmul {a_perm}, {b_perm} : {}, {} -> {}",
        c.name(),
        value_type_logical(a)?,
        value_type_logical(b)?,
        value_type_logical(c)?
    );

    emit_output_permute(out, "permute_C", op, &format!("%{}_perm", c.name()), c)
}
