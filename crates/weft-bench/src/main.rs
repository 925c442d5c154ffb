//! Convolution benchmark driver with a MIOpen-compatible flag surface.

use std::process;

use anyhow::{anyhow, bail, Result};
use half::{bf16, f16};
use weft::layout::{channels_last_order, contiguous_strides, strides_for_order};
use weft::{
    Backend, Buffer, ConvDGradAttr, ConvFPropAttr, ConvWGradAttr, DataType, Graph, Handle,
    PointwiseAttr, PointwiseMode, TensorAttr, VariantPack,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("weft-bench failed: {err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };
    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "conv" => run_conv(args.collect()),
        other => bail!("unknown subcommand '{other}'"),
    }
}

const CONV_USAGE: &str = "\
Usage: weft-bench conv -F <1|2|4> -n N -c C -H H -W W -k K -y R -x S
            -u SH -v SW -p PH -q PW -l DH -j DW --spatial_dim <2|3>
            --in_layout L --fil_layout L --out_layout L -i ITER
            [-g G] [--in_d D --fil_d Z --conv_stride_d T --pad_d O --dilation_d M]
            [--bias] [--fp16 | --bf16]

Set WEFT_BACKEND=gfx942 to target the GPU backend (default: cpu).";

fn print_help() {
    eprintln!("{CONV_USAGE}");
}

#[derive(Debug)]
struct ConvOptions {
    mode: i64,
    n: i64,
    c: i64,
    d: i64,
    h: i64,
    w: i64,
    g: i64,
    k: i64,
    z: i64,
    y: i64,
    x: i64,
    t: i64,
    u: i64,
    v: i64,
    o: i64,
    p: i64,
    q: i64,
    m: i64,
    l: i64,
    j: i64,
    in_layout: String,
    fil_layout: String,
    out_layout: String,
    spatial_dim: i64,
    iter: i64,
    bias: bool,
    fp16: bool,
    bf16: bool,
}

impl Default for ConvOptions {
    fn default() -> Self {
        ConvOptions {
            mode: 0,
            n: 0,
            c: 0,
            d: -1,
            h: 0,
            w: 0,
            g: 1,
            k: 0,
            z: -1,
            y: 0,
            x: 0,
            t: -1,
            u: 0,
            v: 0,
            o: -1,
            p: -1,
            q: -1,
            m: -1,
            l: 0,
            j: 0,
            in_layout: String::new(),
            fil_layout: String::new(),
            out_layout: String::new(),
            spatial_dim: 0,
            iter: 0,
            bias: false,
            fp16: false,
            bf16: false,
        }
    }
}

fn next_value(raw: &[String], index: &mut usize, flag: &str) -> Result<String> {
    *index += 1;
    raw.get(*index)
        .cloned()
        .ok_or_else(|| anyhow!("flag {flag} requires a value"))
}

fn parse_conv_options(raw: Vec<String>) -> Result<ConvOptions> {
    let mut opts = ConvOptions::default();
    let mut index = 0usize;

    while index < raw.len() {
        let flag = raw[index].as_str();
        match flag {
            "--mode" | "-F" => opts.mode = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--batchsize" | "-n" => opts.n = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--in_channels" | "-c" => {
                opts.c = parse_int(&next_value(&raw, &mut index, flag)?, flag)?
            }
            "--in_d" => opts.d = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--in_h" | "-H" => opts.h = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--in_w" | "-W" => opts.w = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--group_count" | "-g" => {
                opts.g = parse_int(&next_value(&raw, &mut index, flag)?, flag)?
            }
            "--out_channels" | "-k" => {
                opts.k = parse_int(&next_value(&raw, &mut index, flag)?, flag)?
            }
            "--fil_d" => opts.z = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--fil_h" | "-y" => opts.y = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--fil_w" | "-x" => opts.x = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--conv_stride_d" => opts.t = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--conv_stride_h" | "-u" => {
                opts.u = parse_int(&next_value(&raw, &mut index, flag)?, flag)?
            }
            "--conv_stride_w" | "-v" => {
                opts.v = parse_int(&next_value(&raw, &mut index, flag)?, flag)?
            }
            "--pad_d" => opts.o = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--pad_h" | "-p" => opts.p = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--pad_w" | "-q" => opts.q = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--dilation_d" => opts.m = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--dilation_h" | "-l" => {
                opts.l = parse_int(&next_value(&raw, &mut index, flag)?, flag)?
            }
            "--dilation_w" | "-j" => {
                opts.j = parse_int(&next_value(&raw, &mut index, flag)?, flag)?
            }
            "--in_layout" => opts.in_layout = next_value(&raw, &mut index, flag)?,
            "--fil_layout" => opts.fil_layout = next_value(&raw, &mut index, flag)?,
            "--out_layout" => opts.out_layout = next_value(&raw, &mut index, flag)?,
            "--spatial_dim" => {
                opts.spatial_dim = parse_int(&next_value(&raw, &mut index, flag)?, flag)?
            }
            "--iter" | "-i" => opts.iter = parse_int(&next_value(&raw, &mut index, flag)?, flag)?,
            "--bias" | "-b" => opts.bias = true,
            "--fp16" => opts.fp16 = true,
            "--bf16" => opts.bf16 = true,
            other => bail!("unknown conv flag '{other}'"),
        }
        index += 1;
    }
    Ok(opts)
}

fn parse_int(value: &str, flag: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|_| anyhow!("flag {flag} expects an integer, got '{value}'"))
}

fn validate_conv_options(opts: &ConvOptions) -> Result<()> {
    if !matches!(opts.mode, 1 | 2 | 4) {
        bail!("conv mode (-F) must be 1 (forward), 2 (data_grad) or 4 (weight_grad)");
    }
    for (label, value) in [
        ("batchsize", opts.n),
        ("in_channels", opts.c),
        ("in_h", opts.h),
        ("in_w", opts.w),
        ("out_channels", opts.k),
        ("fil_h", opts.y),
        ("fil_w", opts.x),
        ("conv_stride_h", opts.u),
        ("conv_stride_w", opts.v),
        ("dilation_h", opts.l),
        ("dilation_w", opts.j),
        ("group_count", opts.g),
        ("iter", opts.iter),
    ] {
        if value < 1 {
            bail!("{label} must be a positive integer");
        }
    }
    if opts.p < 0 || opts.q < 0 {
        bail!("pad_h and pad_w must be non-negative");
    }
    if !matches!(opts.spatial_dim, 2 | 3) {
        bail!("spatial_dim must be 2 or 3");
    }
    let valid_layouts = ["NCHW", "NHWC", "NCDHW", "NDHWC"];
    for (label, layout) in [
        ("in_layout", &opts.in_layout),
        ("fil_layout", &opts.fil_layout),
        ("out_layout", &opts.out_layout),
    ] {
        if !valid_layouts.contains(&layout.as_str()) {
            bail!("{label} must be one of NCHW, NHWC, NCDHW, NDHWC");
        }
        let expected = if opts.spatial_dim == 2 { 4 } else { 5 };
        if layout.len() != expected {
            bail!(
                "{label} '{layout}' is invalid for a {}D convolution",
                opts.spatial_dim
            );
        }
    }
    if opts.spatial_dim == 3
        && (opts.d == -1 || opts.z == -1 || opts.t == -1 || opts.o == -1 || opts.m == -1)
    {
        bail!("in_d, fil_d, conv_stride_d, pad_d and dilation_d must be set for 3D convolution");
    }
    if opts.c % opts.g != 0 || opts.k % opts.g != 0 {
        bail!("group_count must divide both in_channels and out_channels");
    }
    if opts.bias && opts.mode != 1 {
        bail!("--bias is only supported for forward convolution (mode=1)");
    }
    if opts.fp16 && opts.bf16 {
        bail!("--fp16 and --bf16 are mutually exclusive");
    }
    Ok(())
}

fn run_conv(raw: Vec<String>) -> Result<()> {
    let opts = parse_conv_options(raw)?;
    validate_conv_options(&opts)?;
    log::debug!("parsed conv options: {opts:?}");

    println!("weft benchmark started...");

    let io_type = if opts.fp16 {
        DataType::Half
    } else if opts.bf16 {
        DataType::BFloat16
    } else {
        DataType::Float
    };

    match opts.mode {
        1 => benchmark_conv_fprop(&opts, io_type)?,
        2 => benchmark_conv_dgrad(&opts, io_type)?,
        4 => benchmark_conv_wgrad(&opts, io_type)?,
        _ => unreachable!("mode validated above"),
    }

    println!("weft benchmark complete!");
    Ok(())
}

fn bench_backend() -> Backend {
    match std::env::var("WEFT_BACKEND").as_deref() {
        Ok("gfx942") | Ok("GFX942") => Backend::Gfx942,
        _ => Backend::Cpu,
    }
}

fn layout_strides(dims: &[i64], layout: &str) -> Vec<i64> {
    if layout == "NCHW" || layout == "NCDHW" {
        contiguous_strides(dims)
    } else {
        strides_for_order(dims, &channels_last_order(dims.len()))
    }
}

/// Forward output shape with the same inference the graph applies.
fn conv_inferred_output_dims(
    x_dims: &[i64],
    w_dims: &[i64],
    dilation: &[i64],
    padding: &[i64],
    stride: &[i64],
) -> Vec<i64> {
    let mut out = vec![x_dims[0], w_dims[0]];
    for axis in 0..x_dims.len() - 2 {
        let x = x_dims[axis + 2];
        let w = w_dims[axis + 2];
        out.push((x + 2 * padding[axis] - dilation[axis] * (w - 1) - 1) / stride[axis] + 1);
    }
    out
}

/// Every flag lands in the graph name so concurrent driver invocations get
/// disjoint cache directories.
fn graph_name(kind: &str, opts: &ConvOptions, bias: bool) -> String {
    format!(
        "benchmark_conv_{kind}_n{}_c{}_d{}_h{}_w{}_g{}_k{}_z{}_y{}_x{}_t{}_u{}_v{}_o{}_p{}_q{}_m{}_l{}_j{}_S{}_I{}_O{}_F{}_bias{}",
        opts.n, opts.c, opts.d, opts.h, opts.w, opts.g, opts.k, opts.z, opts.y, opts.x, opts.t,
        opts.u, opts.v, opts.o, opts.p, opts.q, opts.m, opts.l, opts.j, opts.spatial_dim,
        opts.in_layout, opts.out_layout, opts.fil_layout, bias
    )
}

struct ConvGeometry {
    x_dims: Vec<i64>,
    w_dims: Vec<i64>,
    stride: Vec<i64>,
    padding: Vec<i64>,
    dilation: Vec<i64>,
}

fn conv_geometry(opts: &ConvOptions) -> ConvGeometry {
    let fc = opts.c / opts.g;
    if opts.spatial_dim == 2 {
        ConvGeometry {
            x_dims: vec![opts.n, opts.c, opts.h, opts.w],
            w_dims: vec![opts.k, fc, opts.y, opts.x],
            stride: vec![opts.u, opts.v],
            padding: vec![opts.p, opts.q],
            dilation: vec![opts.l, opts.j],
        }
    } else {
        ConvGeometry {
            x_dims: vec![opts.n, opts.c, opts.d, opts.h, opts.w],
            w_dims: vec![opts.k, fc, opts.z, opts.y, opts.x],
            stride: vec![opts.t, opts.u, opts.v],
            padding: vec![opts.o, opts.p, opts.q],
            dilation: vec![opts.m, opts.l, opts.j],
        }
    }
}

fn allocate_filled(
    handle: &Handle,
    dims: &[i64],
    data_type: DataType,
    value: f32,
) -> Result<Buffer> {
    let count = dims.iter().product::<i64>() as usize;
    let buffer = match data_type {
        DataType::Half => Buffer::allocate(handle, dims, &vec![f16::from_f32(value); count])?,
        DataType::BFloat16 => Buffer::allocate(handle, dims, &vec![bf16::from_f32(value); count])?,
        DataType::Float => Buffer::allocate(handle, dims, &vec![value; count])?,
        other => bail!("unsupported benchmark I/O type {other:?}"),
    };
    Ok(buffer)
}

fn benchmark_conv_fprop(opts: &ConvOptions, io_type: DataType) -> Result<()> {
    let handle = Handle::create(bench_backend())?;
    let geometry = conv_geometry(opts);

    let x_stride = layout_strides(&geometry.x_dims, &opts.in_layout);
    let w_stride = layout_strides(&geometry.w_dims, &opts.fil_layout);
    let bias_dims: Vec<i64> = {
        let mut dims = vec![1i64; geometry.x_dims.len()];
        dims[1] = opts.k;
        dims
    };
    let bias_stride = layout_strides(&bias_dims, &opts.in_layout);

    let mut graph = Graph::new();
    graph.set_name(graph_name("fprop", opts, opts.bias));
    // Graph-level types stay fp32; tensors carry the configured I/O type
    // explicitly, so these only back-fill unannotated records.
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float)
        .set_intermediate_data_type(DataType::Float);

    let x = graph.tensor(
        TensorAttr::new()
            .with_name("input")
            .with_dim(geometry.x_dims.clone())
            .with_stride(x_stride)
            .with_data_type(io_type),
    );
    let w = graph.tensor(
        TensorAttr::new()
            .with_name("filter")
            .with_dim(geometry.w_dims.clone())
            .with_stride(w_stride)
            .with_data_type(io_type),
    );

    let conv_attr = ConvFPropAttr::new()
        .with_stride(geometry.stride.clone())
        .with_padding(geometry.padding.clone())
        .with_dilation(geometry.dilation.clone())
        .with_name("conv_fprop");
    let mut y = graph.conv_fprop(x, w, conv_attr);
    graph.tensor_attr_mut(y).set_data_type(io_type);

    let mut bias_tensor = None;
    if opts.bias {
        let b = graph.tensor(
            TensorAttr::new()
                .with_name("bias")
                .with_dim(bias_dims.clone())
                .with_stride(bias_stride)
                .with_data_type(io_type),
        );
        let bias_attr = PointwiseAttr::new().with_mode(PointwiseMode::Add);
        y = graph.pointwise(y, b, bias_attr);
        graph.tensor_attr_mut(y).set_data_type(io_type);
        bias_tensor = Some(b);
    }
    graph.tensor_attr_mut(y).set_output(true).set_data_type(io_type);

    graph.validate()?;
    graph.compile(&handle, /*remove=*/ true)?;

    let y_dims = graph.tensor_attr(y).dim().to_vec();
    let mut x_buf = allocate_filled(&handle, &geometry.x_dims, io_type, 1.0)?;
    let mut w_buf = allocate_filled(&handle, &geometry.w_dims, io_type, 1.0)?;
    let mut y_buf = allocate_filled(&handle, &y_dims, io_type, 0.0)?;
    let mut b_buf = match bias_tensor {
        Some(_) => Some(allocate_filled(&handle, &bias_dims, io_type, 1.0)?),
        None => None,
    };

    let mut pack = VariantPack::new();
    pack.insert(x, &mut x_buf).insert(w, &mut w_buf).insert(y, &mut y_buf);
    if let (Some(b), Some(buf)) = (bias_tensor, b_buf.as_mut()) {
        pack.insert(b, buf);
    }

    for _ in 0..opts.iter {
        graph.execute(&handle, &mut pack)?;
    }
    Ok(())
}

fn benchmark_conv_dgrad(opts: &ConvOptions, io_type: DataType) -> Result<()> {
    let handle = Handle::create(bench_backend())?;
    let geometry = conv_geometry(opts);

    let dy_dims = conv_inferred_output_dims(
        &geometry.x_dims,
        &geometry.w_dims,
        &geometry.dilation,
        &geometry.padding,
        &geometry.stride,
    );
    let dy_stride = layout_strides(&dy_dims, &opts.out_layout);
    let w_stride = layout_strides(&geometry.w_dims, &opts.fil_layout);

    let mut graph = Graph::new();
    graph.set_name(graph_name("dgrad", opts, false));
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float)
        .set_intermediate_data_type(DataType::Float);

    let dy = graph.tensor(
        TensorAttr::new()
            .with_name("dy")
            .with_dim(dy_dims.clone())
            .with_stride(dy_stride)
            .with_data_type(io_type),
    );
    let w = graph.tensor(
        TensorAttr::new()
            .with_name("filter")
            .with_dim(geometry.w_dims.clone())
            .with_stride(w_stride)
            .with_data_type(io_type),
    );

    let conv_attr = ConvDGradAttr::new()
        .with_stride(geometry.stride.clone())
        .with_padding(geometry.padding.clone())
        .with_dilation(geometry.dilation.clone())
        .with_name("conv_dgrad");
    let dx = graph.conv_dgrad(dy, w, conv_attr);
    graph
        .tensor_attr_mut(dx)
        .set_dim(geometry.x_dims.clone())
        .set_output(true)
        .set_data_type(io_type);

    graph.validate()?;
    graph.compile(&handle, /*remove=*/ true)?;

    let mut dy_buf = allocate_filled(&handle, &dy_dims, io_type, 1.0)?;
    let mut w_buf = allocate_filled(&handle, &geometry.w_dims, io_type, 1.0)?;
    let mut dx_buf = allocate_filled(&handle, &geometry.x_dims, io_type, 0.0)?;

    let mut pack = VariantPack::new();
    pack.insert(dy, &mut dy_buf)
        .insert(w, &mut w_buf)
        .insert(dx, &mut dx_buf);

    for _ in 0..opts.iter {
        graph.execute(&handle, &mut pack)?;
    }
    Ok(())
}

fn benchmark_conv_wgrad(opts: &ConvOptions, io_type: DataType) -> Result<()> {
    let handle = Handle::create(bench_backend())?;
    let geometry = conv_geometry(opts);

    let dy_dims = conv_inferred_output_dims(
        &geometry.x_dims,
        &geometry.w_dims,
        &geometry.dilation,
        &geometry.padding,
        &geometry.stride,
    );
    let dy_stride = layout_strides(&dy_dims, &opts.out_layout);
    let x_stride = layout_strides(&geometry.x_dims, &opts.in_layout);

    let mut graph = Graph::new();
    graph.set_name(graph_name("wgrad", opts, false));
    graph
        .set_io_data_type(DataType::Float)
        .set_compute_data_type(DataType::Float)
        .set_intermediate_data_type(DataType::Float);

    let dy = graph.tensor(
        TensorAttr::new()
            .with_name("dy")
            .with_dim(dy_dims.clone())
            .with_stride(dy_stride)
            .with_data_type(io_type),
    );
    let x = graph.tensor(
        TensorAttr::new()
            .with_name("input")
            .with_dim(geometry.x_dims.clone())
            .with_stride(x_stride)
            .with_data_type(io_type),
    );

    let conv_attr = ConvWGradAttr::new()
        .with_stride(geometry.stride.clone())
        .with_padding(geometry.padding.clone())
        .with_dilation(geometry.dilation.clone())
        .with_name("conv_wgrad");
    let dw = graph.conv_wgrad(dy, x, conv_attr);
    graph
        .tensor_attr_mut(dw)
        .set_dim(geometry.w_dims.clone())
        .set_output(true)
        .set_data_type(io_type);

    graph.validate()?;
    graph.compile(&handle, /*remove=*/ true)?;

    let mut dy_buf = allocate_filled(&handle, &dy_dims, io_type, 1.0)?;
    let mut x_buf = allocate_filled(&handle, &geometry.x_dims, io_type, 1.0)?;
    let mut dw_buf = allocate_filled(&handle, &geometry.w_dims, io_type, 0.0)?;

    let mut pack = VariantPack::new();
    pack.insert(dy, &mut dy_buf)
        .insert(x, &mut x_buf)
        .insert(dw, &mut dw_buf);

    for _ in 0..opts.iter {
        graph.execute(&handle, &mut pack)?;
    }
    Ok(())
}
