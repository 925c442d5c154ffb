use weft::{
    ConvDGradAttr, ConvFPropAttr, DataType, ErrorKind, Graph, MatmulAttr, PointwiseAttr,
    PointwiseMode, TensorAttr,
};

fn nchw_strides(dim: &[i64]) -> Vec<i64> {
    weft::layout::contiguous_strides(dim)
}

fn fprop_graph() -> Graph {
    let (n, c, h, w, k) = (16, 128, 64, 64, 256);
    let mut graph = Graph::new();
    graph.set_name("fprop_validate");
    graph
        .set_io_data_type(DataType::Half)
        .set_compute_data_type(DataType::Float);

    let x = graph.tensor(
        TensorAttr::new()
            .with_name("image")
            .with_dim(vec![n, c, h, w])
            .with_stride(nchw_strides(&[n, c, h, w])),
    );
    let w_t = graph.tensor(
        TensorAttr::new()
            .with_name("filter")
            .with_dim(vec![k, c, 1, 1])
            .with_stride(nchw_strides(&[k, c, 1, 1])),
    );
    let conv = ConvFPropAttr::new()
        .with_padding(vec![0, 0])
        .with_stride(vec![1, 1])
        .with_dilation(vec![1, 1])
        .with_name("conv_fprop");
    let y = graph.conv_fprop(x, w_t, conv);
    graph.tensor_attr_mut(y).set_output(true);
    graph
}

#[test]
fn graph_name_is_required() {
    let mut graph = Graph::new();
    let err = graph.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AttributeNotSet);
}

#[test]
fn fprop_output_shape_is_inferred() {
    let mut graph = fprop_graph();
    graph.validate().unwrap();
    let y = *graph.sorted_outputs().first().unwrap();
    assert_eq!(graph.tensor_attr(y).dim(), &[16, 256, 64, 64]);
    // Contiguous output strides, following the NCHW image.
    assert_eq!(
        graph.tensor_attr(y).stride(),
        &[256 * 64 * 64, 64 * 64, 64, 1]
    );
    // Non-virtual output inherits the graph I/O type.
    assert_eq!(graph.tensor_attr(y).data_type(), DataType::Half);
}

#[test]
fn strided_conv_output_shape() {
    let mut graph = Graph::new();
    graph.set_name("strided_fprop");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let x = graph.tensor(
        TensorAttr::new()
            .with_name("image")
            .with_dim(vec![1, 8, 32, 32])
            .with_stride(nchw_strides(&[1, 8, 32, 32])),
    );
    let w = graph.tensor(
        TensorAttr::new()
            .with_name("filter")
            .with_dim(vec![16, 8, 3, 3])
            .with_stride(nchw_strides(&[16, 8, 3, 3])),
    );
    let conv = ConvFPropAttr::new()
        .with_padding(vec![1, 1])
        .with_stride(vec![2, 2])
        .with_dilation(vec![1, 1]);
    let y = graph.conv_fprop(x, w, conv);
    graph.tensor_attr_mut(y).set_output(true);
    graph.validate().unwrap();
    // floor((32 + 2*1 - 1*(3-1) - 1) / 2) + 1 = 16
    assert_eq!(graph.tensor_attr(y).dim(), &[1, 16, 16, 16]);
}

#[test]
fn nhwc_input_yields_nhwc_output_strides() {
    let (n, c, h, w, k) = (4, 16, 8, 8, 32);
    let mut graph = Graph::new();
    graph.set_name("fprop_nhwc");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let x = graph.tensor(
        TensorAttr::new()
            .with_name("image")
            .with_dim(vec![n, c, h, w])
            .with_stride(vec![c * h * w, 1, c * w, c]),
    );
    let w_t = graph.tensor(
        TensorAttr::new()
            .with_name("filter")
            .with_dim(vec![k, c, 1, 1])
            .with_stride(nchw_strides(&[k, c, 1, 1])),
    );
    let y = graph.conv_fprop(
        x,
        w_t,
        ConvFPropAttr::new()
            .with_padding(vec![0, 0])
            .with_stride(vec![1, 1])
            .with_dilation(vec![1, 1]),
    );
    graph.tensor_attr_mut(y).set_output(true);
    graph.validate().unwrap();
    // Output stride order follows the channels-last image.
    assert_eq!(graph.tensor_attr(y).stride(), &[k * h * w, 1, k * w, k]);
    assert_eq!(graph.tensor_attr(y).physical_dims(), vec![n, h, w, k]);
}

#[test]
fn validation_is_idempotent() {
    let mut graph = fprop_graph();
    graph.validate().unwrap();
    let y = *graph.sorted_outputs().first().unwrap();
    let first = graph.tensor_attr(y).clone();
    graph.validate().unwrap();
    assert_eq!(graph.tensor_attr(y), &first);
    assert_eq!(graph.sorted_outputs().len(), 1);
}

#[test]
fn duplicate_tensor_names_are_rejected() {
    let mut graph = Graph::new();
    graph.set_name("dups");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let a = graph.tensor(
        TensorAttr::new()
            .with_name("same")
            .with_dim(vec![2, 2])
            .with_stride(vec![2, 1]),
    );
    let b = graph.tensor(
        TensorAttr::new()
            .with_name("same")
            .with_dim(vec![2, 2])
            .with_stride(vec![2, 1]),
    );
    let c = graph.pointwise(a, b, PointwiseAttr::new().with_mode(PointwiseMode::Add));
    graph.tensor_attr_mut(c).set_output(true);
    let err = graph.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
    assert!(err.message().contains("already in use"));
}

#[test]
fn duplicate_node_names_are_rejected() {
    let mut graph = Graph::new();
    graph.set_name("dup_nodes");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let a = graph.tensor(
        TensorAttr::new()
            .with_name("a")
            .with_dim(vec![2, 2])
            .with_stride(vec![2, 1]),
    );
    let b = graph.tensor(
        TensorAttr::new()
            .with_name("b")
            .with_dim(vec![2, 2])
            .with_stride(vec![2, 1]),
    );
    let c = graph.pointwise(
        a,
        b,
        PointwiseAttr::new().with_mode(PointwiseMode::Add).with_name("op"),
    );
    let d = graph.pointwise(
        c,
        b,
        PointwiseAttr::new().with_mode(PointwiseMode::Add).with_name("op"),
    );
    graph.tensor_attr_mut(d).set_output(true);
    let err = graph.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
}

#[test]
fn pointwise_shape_mismatch_is_rejected() {
    let mut graph = Graph::new();
    graph.set_name("bad_broadcast");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let a = graph.tensor(
        TensorAttr::new()
            .with_name("a")
            .with_dim(vec![2, 3])
            .with_stride(vec![3, 1]),
    );
    let b = graph.tensor(
        TensorAttr::new()
            .with_name("b")
            .with_dim(vec![2, 4])
            .with_stride(vec![4, 1]),
    );
    let c = graph.pointwise(a, b, PointwiseAttr::new().with_mode(PointwiseMode::Add));
    graph.tensor_attr_mut(c).set_output(true);
    let err = graph.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
}

#[test]
fn conv_group_count_must_divide() {
    let mut graph = Graph::new();
    graph.set_name("bad_groups");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let x = graph.tensor(
        TensorAttr::new()
            .with_name("image")
            .with_dim(vec![1, 10, 4, 4])
            .with_stride(nchw_strides(&[1, 10, 4, 4])),
    );
    let w = graph.tensor(
        TensorAttr::new()
            .with_name("filter")
            .with_dim(vec![8, 3, 1, 1])
            .with_stride(nchw_strides(&[8, 3, 1, 1])),
    );
    let y = graph.conv_fprop(
        x,
        w,
        ConvFPropAttr::new()
            .with_padding(vec![0, 0])
            .with_stride(vec![1, 1])
            .with_dilation(vec![1, 1]),
    );
    graph.tensor_attr_mut(y).set_output(true);
    let err = graph.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
    assert!(err.message().contains("divisible"));
}

#[test]
fn conv_rank_mismatch_is_rejected() {
    let mut graph = Graph::new();
    graph.set_name("bad_rank");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let x = graph.tensor(
        TensorAttr::new()
            .with_name("image")
            .with_dim(vec![1, 8, 4, 4])
            .with_stride(nchw_strides(&[1, 8, 4, 4])),
    );
    let w = graph.tensor(
        TensorAttr::new()
            .with_name("filter")
            .with_dim(vec![8, 8, 1, 1])
            .with_stride(nchw_strides(&[8, 8, 1, 1])),
    );
    // Three stride entries against two spatial dims.
    let y = graph.conv_fprop(
        x,
        w,
        ConvFPropAttr::new()
            .with_padding(vec![0, 0])
            .with_stride(vec![1, 1, 1])
            .with_dilation(vec![1, 1]),
    );
    graph.tensor_attr_mut(y).set_output(true);
    let err = graph.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
}

#[test]
fn dgrad_requires_explicit_output_dims() {
    let mut graph = Graph::new();
    graph.set_name("dgrad_missing_dims");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let dy = graph.tensor(
        TensorAttr::new()
            .with_name("dy")
            .with_dim(vec![1, 8, 4, 4])
            .with_stride(nchw_strides(&[1, 8, 4, 4])),
    );
    let w = graph.tensor(
        TensorAttr::new()
            .with_name("filter")
            .with_dim(vec![8, 8, 1, 1])
            .with_stride(nchw_strides(&[8, 8, 1, 1])),
    );
    let dx = graph.conv_dgrad(
        dy,
        w,
        ConvDGradAttr::new()
            .with_padding(vec![0, 0])
            .with_stride(vec![1, 1])
            .with_dilation(vec![1, 1]),
    );
    graph.tensor_attr_mut(dx).set_output(true);
    let err = graph.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AttributeNotSet);
}

#[test]
fn matmul_inner_dims_must_agree() {
    let mut graph = Graph::new();
    graph.set_name("bad_matmul");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let a = graph.tensor(
        TensorAttr::new()
            .with_name("a")
            .with_dim(vec![3, 4])
            .with_stride(vec![4, 1]),
    );
    let b = graph.tensor(
        TensorAttr::new()
            .with_name("b")
            .with_dim(vec![5, 2])
            .with_stride(vec![2, 1]),
    );
    let c = graph.matmul(a, b, MatmulAttr::new());
    graph.tensor_attr_mut(c).set_output(true);
    let err = graph.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
}

#[test]
fn matmul_output_shape_is_inferred() {
    let mut graph = Graph::new();
    graph.set_name("matmul_infer");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let a = graph.tensor(
        TensorAttr::new()
            .with_name("a")
            .with_dim(vec![3, 4])
            .with_stride(vec![4, 1]),
    );
    let b = graph.tensor(
        TensorAttr::new()
            .with_name("b")
            .with_dim(vec![4, 5])
            .with_stride(vec![5, 1]),
    );
    let c = graph.matmul(a, b, MatmulAttr::new());
    graph.tensor_attr_mut(c).set_output(true);
    graph.validate().unwrap();
    assert_eq!(graph.tensor_attr(c).dim(), &[3, 5]);
}

#[test]
fn sorted_views_are_name_ordered() {
    let mut graph = Graph::new();
    graph.set_name("sorting");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let zeta = graph.tensor(
        TensorAttr::new()
            .with_name("zeta")
            .with_dim(vec![2, 2])
            .with_stride(vec![2, 1]),
    );
    let alpha = graph.tensor(
        TensorAttr::new()
            .with_name("alpha")
            .with_dim(vec![2, 2])
            .with_stride(vec![2, 1]),
    );
    let out = graph.pointwise(zeta, alpha, PointwiseAttr::new().with_mode(PointwiseMode::Add));
    graph.tensor_attr_mut(out).set_name("result").set_output(true);
    graph.validate().unwrap();

    let input_names: Vec<&str> = graph
        .sorted_inputs()
        .iter()
        .map(|&id| graph.tensor_attr(id).name())
        .collect();
    assert_eq!(input_names, vec!["alpha", "zeta"]);
    let output_names: Vec<&str> = graph
        .sorted_outputs()
        .iter()
        .map(|&id| graph.tensor_attr(id).name())
        .collect();
    assert_eq!(output_names, vec!["result"]);
}

#[test]
fn intermediate_type_applies_to_virtual_tensors() {
    let mut graph = Graph::new();
    graph.set_name("virtual_types");
    graph
        .set_io_data_type(DataType::Half)
        .set_compute_data_type(DataType::Float)
        .set_intermediate_data_type(DataType::Float);
    let x = graph.tensor(
        TensorAttr::new()
            .with_name("image")
            .with_dim(vec![1, 4, 4, 4])
            .with_stride(nchw_strides(&[1, 4, 4, 4])),
    );
    let w = graph.tensor(
        TensorAttr::new()
            .with_name("filter")
            .with_dim(vec![4, 4, 1, 1])
            .with_stride(nchw_strides(&[4, 4, 1, 1])),
    );
    let bias = graph.tensor(
        TensorAttr::new()
            .with_name("bias")
            .with_dim(vec![1, 4, 1, 1])
            .with_stride(vec![4, 1, 1, 1]),
    );
    let conv_out = graph.conv_fprop(
        x,
        w,
        ConvFPropAttr::new()
            .with_padding(vec![0, 0])
            .with_stride(vec![1, 1])
            .with_dilation(vec![1, 1]),
    );
    let final_out = graph.pointwise(
        conv_out,
        bias,
        PointwiseAttr::new().with_mode(PointwiseMode::Add),
    );
    graph.tensor_attr_mut(final_out).set_output(true);
    graph.validate().unwrap();

    // The conv result stays virtual and takes the intermediate type; the
    // user-visible sum takes the I/O type.
    assert!(graph.tensor_attr(conv_out).is_virtual());
    assert_eq!(graph.tensor_attr(conv_out).data_type(), DataType::Float);
    assert_eq!(graph.tensor_attr(final_out).data_type(), DataType::Half);
}

#[test]
fn emit_before_validate_is_rejected() {
    let graph = fprop_graph();
    let err = graph.emit_asm().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotValidated);
}

#[test]
fn auto_naming_fills_missing_names() {
    let mut graph = Graph::new();
    graph.set_name("auto_names");
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float);
    let x = graph.tensor(
        TensorAttr::new()
            .with_dim(vec![1, 4, 4, 4])
            .with_stride(nchw_strides(&[1, 4, 4, 4])),
    );
    let w = graph.tensor(
        TensorAttr::new()
            .with_dim(vec![4, 4, 1, 1])
            .with_stride(nchw_strides(&[4, 4, 1, 1])),
    );
    let y = graph.conv_fprop(
        x,
        w,
        ConvFPropAttr::new()
            .with_padding(vec![0, 0])
            .with_stride(vec![1, 1])
            .with_dilation(vec![1, 1]),
    );
    assert_eq!(graph.tensor_attr(x).name(), "conv_fprop_0_X");
    assert_eq!(graph.tensor_attr(w).name(), "conv_fprop_0_W");
    assert_eq!(graph.tensor_attr(y).name(), "conv_fprop_0_Y");
    assert!(graph.tensor_attr(y).is_virtual());
}
