//! Serializes a validated graph into a torch-dialect MLIR module.
//!
//! The output is a bit-exact contract with the downstream toolchain: one
//! `func.func @main` whose arguments are the name-sorted outputs (mutable
//! tensors) followed by the name-sorted inputs (value tensors), each typed
//! with physical dims. Every operand gets a permute preamble from physical
//! to logical order and every result a permute epilogue back, emitted even
//! when the permutation is the identity so the text stays stable.

mod conv;
mod matmul;
mod pointwise;

use std::fmt::Write as _;

use crate::attributes::TensorAttr;
use crate::error::Result;
use crate::graph::{Graph, Node};
use crate::layout;

pub(crate) fn emit_graph(graph: &Graph) -> Result<String> {
    let mut out = String::new();
    out.push_str("module @module {\n");
    out.push_str("  func.func @main(");

    let mut args = Vec::new();
    for &id in graph.sorted_outputs() {
        let tensor = graph.arena().get(id);
        args.push(format!(
            "%{}_: {}",
            tensor.name(),
            mutable_type_physical(tensor)?
        ));
    }
    for &id in graph.sorted_inputs() {
        let tensor = graph.arena().get(id);
        args.push(format!(
            "%{}: {}",
            tensor.name(),
            value_type_physical(tensor)?
        ));
    }
    out.push_str(&args.join(", "));
    out.push_str(") attributes {torch.assume_strict_symbolic_shapes} {\n");

    for node in graph.nodes() {
        match node {
            Node::ConvFProp(attr) => conv::emit_fprop(&mut out, graph, attr)?,
            Node::ConvDGrad(attr) => conv::emit_dgrad(&mut out, graph, attr)?,
            Node::ConvWGrad(attr) => conv::emit_wgrad(&mut out, graph, attr)?,
            Node::Pointwise(attr) => pointwise::emit(&mut out, graph, attr)?,
            Node::Matmul(attr) => matmul::emit(&mut out, graph, attr)?,
        }
    }

    out.push_str("    return\n");
    out.push_str("  }\n");
    out.push_str("}\n");
    Ok(out)
}

/// `!torch.vtensor<[dims],dtype>` with physical (decreasing-stride) dims.
pub(super) fn value_type_physical(tensor: &TensorAttr) -> Result<String> {
    torch_type("vtensor", &tensor.physical_dims(), tensor)
}

/// `!torch.vtensor<[dims],dtype>` with logical dims.
pub(super) fn value_type_logical(tensor: &TensorAttr) -> Result<String> {
    torch_type("vtensor", tensor.dim(), tensor)
}

/// `!torch.tensor<[dims],dtype>` with physical dims; the mutable flavor
/// used for destination-passing function arguments.
pub(super) fn mutable_type_physical(tensor: &TensorAttr) -> Result<String> {
    torch_type("tensor", &tensor.physical_dims(), tensor)
}

fn torch_type(kind: &str, dims: &[i64], tensor: &TensorAttr) -> Result<String> {
    let rendered: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
    Ok(format!(
        "!torch.{kind}<[{}],{}>",
        rendered.join(","),
        tensor.data_type().asm_spelling()?
    ))
}

/// Emits `torch.constant.int` values named `%<label>_val_<i>_<op>` followed
/// by the `torch.prim.ListConstruct` collecting them as `%<label>_<op>`.
pub(super) fn emit_int_list(out: &mut String, label: &str, op: &str, values: &[i64]) {
    for (index, value) in values.iter().enumerate() {
        let _ = writeln!(
            out,
            "    %{label}_val_{index}_{op} = torch.constant.int {value}"
        );
    }
    let operands: Vec<String> = (0..values.len())
        .map(|index| format!("%{label}_val_{index}_{op}"))
        .collect();
    let types: Vec<&str> = values.iter().map(|_| "!torch.int").collect();
    let _ = writeln!(
        out,
        "    %{label}_{op} = torch.prim.ListConstruct {} : ({}) -> !torch.list<int>",
        operands.join(", "),
        types.join(", ")
    );
}

/// Permute preamble for an operand: physical layout in, logical view out.
pub(super) fn emit_input_permute(
    out: &mut String,
    label: &str,
    op: &str,
    result_ssa: &str,
    tensor: &TensorAttr,
) -> Result<()> {
    let perm = layout::invert_permutation(&layout::stride_order(tensor.stride()));
    let perm: Vec<i64> = perm.into_iter().map(|axis| axis as i64).collect();
    emit_int_list(out, label, op, &perm);
    let _ = writeln!(
        out,
        "    {result_ssa} = torch.aten.permute %{}, %{label}_{op} : {}, !torch.list<int> -> {}",
        tensor.name(),
        value_type_physical(tensor)?,
        value_type_logical(tensor)?
    );
    Ok(())
}

/// Permute epilogue for a result: logical value in, physical layout out,
/// then an overwrite into the `%<name>_` destination argument when the
/// tensor is materialized for the caller.
pub(super) fn emit_output_permute(
    out: &mut String,
    label: &str,
    op: &str,
    source_ssa: &str,
    tensor: &TensorAttr,
) -> Result<()> {
    let perm: Vec<i64> = layout::stride_order(tensor.stride())
        .into_iter()
        .map(|axis| axis as i64)
        .collect();
    emit_int_list(out, label, op, &perm);
    let _ = writeln!(
        out,
        "    %{} = torch.aten.permute {source_ssa}, %{label}_{op} : {}, !torch.list<int> -> {}",
        tensor.name(),
        value_type_logical(tensor)?,
        value_type_physical(tensor)?
    );
    if !tensor.is_virtual() {
        let _ = writeln!(
            out,
            "    torch.overwrite.tensor.contents %{name} overwrites %{name}_ : {}, {}",
            value_type_physical(tensor)?,
            mutable_type_physical(tensor)?,
            name = tensor.name(),
        );
    }
    Ok(())
}
