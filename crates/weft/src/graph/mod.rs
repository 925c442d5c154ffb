//! Graph construction, validation and the compile/execute lifecycle.
//!
//! A [`Graph`] is built mutably (tensor and op builders), moved to a
//! validated state by [`Graph::validate`], compiled against a device
//! [`Handle`] by [`Graph::compile`] (which resolves the on-disk compilation
//! cache and opens a runtime session), and then driven by
//! [`Graph::execute`] with a [`VariantPack`] of device buffers.

mod arena;
mod context;
mod node;

pub use context::Context;

pub(crate) use arena::TensorArena;
pub(crate) use node::{group_count, Node};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::attributes::{
    ConvDGradAttr, ConvFPropAttr, ConvWGradAttr, MatmulAttr, PointwiseAttr, TensorAttr, TensorId,
};
use crate::backend::{Backend, Buffer, Handle, Session};
use crate::cache::{self, CacheFile, CacheFileKind, CachedAssets};
use crate::emitter;
use crate::error::{Error, Result};
use crate::types::DataType;

/// Name of the function emitted into every module and invoked at execute.
pub(crate) const ENTRYPOINT: &str = "main";

/// Mapping from tensor handles to device buffer slots for one execute call.
///
/// Output slots may be empty; execute fills them destination-passing style.
/// Every buffer must stay alive until the call returns; the graph neither
/// retains nor releases caller buffers beyond the popped output views.
#[derive(Default)]
pub struct VariantPack<'a> {
    entries: HashMap<TensorId, &'a mut Buffer>,
}

impl<'a> VariantPack<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TensorId, buffer: &'a mut Buffer) -> &mut Self {
        self.entries.insert(id, buffer);
        self
    }

    fn get(&self, id: TensorId) -> Option<&Buffer> {
        self.entries.get(&id).map(|buffer| &**buffer)
    }

    fn get_mut(&mut self, id: TensorId) -> Option<&mut Buffer> {
        self.entries.get_mut(&id).map(|buffer| &mut **buffer)
    }
}

/// Root of the tensor computation DAG.
pub struct Graph {
    context: Context,
    tensors: TensorArena,
    nodes: Vec<Node>,
    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,
    sorted_inputs: Vec<TensorId>,
    sorted_outputs: Vec<TensorId>,
    validated: bool,
    cache: Option<CachedAssets>,
    session: Option<Session>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            context: Context::default(),
            tensors: TensorArena::default(),
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            sorted_inputs: Vec::new(),
            sorted_outputs: Vec::new(),
            validated: false,
            cache: None,
            session: None,
        }
    }

    // Context setters, chainable builder style.

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.context.set_name(name);
        self
    }

    pub fn set_io_data_type(&mut self, data_type: DataType) -> &mut Self {
        self.context.set_io_data_type(data_type);
        self
    }

    pub fn set_compute_data_type(&mut self, data_type: DataType) -> &mut Self {
        self.context.set_compute_data_type(data_type);
        self
    }

    pub fn set_intermediate_data_type(&mut self, data_type: DataType) -> &mut Self {
        self.context.set_intermediate_data_type(data_type);
        self
    }

    pub fn name(&self) -> &str {
        self.context.name()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Registers an input tensor, copying the record into the graph.
    pub fn tensor(&mut self, attr: TensorAttr) -> TensorId {
        log::debug!("adding input tensor '{}' to graph inputs", attr.name());
        let id = self.tensors.insert(attr);
        self.inputs.push(id);
        id
    }

    pub fn tensor_attr(&self, id: TensorId) -> &TensorAttr {
        self.tensors.get(id)
    }

    pub fn tensor_attr_mut(&mut self, id: TensorId) -> &mut TensorAttr {
        self.tensors.get_mut(id)
    }

    /// Allocates the fresh virtual output tensor every op builder returns.
    fn output_tensor(&mut self, name: String) -> TensorId {
        log::debug!("adding output tensor '{name}' to graph outputs");
        let mut attr = TensorAttr::new().with_name(name);
        attr.set_virtual(true);
        let id = self.tensors.insert(attr);
        self.outputs.push(id);
        id
    }

    fn name_if_unset(&mut self, id: TensorId, fallback: String) {
        let tensor = self.tensors.get_mut(id);
        if tensor.name().is_empty() {
            tensor.set_name(fallback);
        }
    }

    /// Adds a forward convolution over `x` and `w`; returns the Y tensor.
    pub fn conv_fprop(&mut self, x: TensorId, w: TensorId, attr: ConvFPropAttr) -> TensorId {
        let mut attr = attr;
        if attr.name.is_empty() {
            attr.name = format!("conv_fprop_{}", self.nodes.len());
        }
        self.name_if_unset(x, format!("{}_X", attr.name));
        self.name_if_unset(w, format!("{}_W", attr.name));
        log::debug!("adding conv fprop node '{}' to graph", attr.name);
        let y = self.output_tensor(format!("{}_Y", attr.name));
        attr.x = Some(x);
        attr.w = Some(w);
        attr.y = Some(y);
        self.nodes.push(Node::ConvFProp(attr));
        y
    }

    /// Adds a data-gradient convolution over `dy` and `w`; returns the DX
    /// tensor. The caller must set DX's dims before validating.
    pub fn conv_dgrad(&mut self, dy: TensorId, w: TensorId, attr: ConvDGradAttr) -> TensorId {
        let mut attr = attr;
        if attr.name.is_empty() {
            attr.name = format!("conv_dgrad_{}", self.nodes.len());
        }
        self.name_if_unset(dy, format!("{}_DY", attr.name));
        self.name_if_unset(w, format!("{}_W", attr.name));
        log::debug!("adding conv dgrad node '{}' to graph", attr.name);
        let dx = self.output_tensor(format!("{}_DX", attr.name));
        attr.dy = Some(dy);
        attr.w = Some(w);
        attr.dx = Some(dx);
        self.nodes.push(Node::ConvDGrad(attr));
        dx
    }

    /// Adds a weight-gradient convolution over `dy` and `x`; returns the DW
    /// tensor. The caller must set DW's dims before validating.
    pub fn conv_wgrad(&mut self, dy: TensorId, x: TensorId, attr: ConvWGradAttr) -> TensorId {
        let mut attr = attr;
        if attr.name.is_empty() {
            attr.name = format!("conv_wgrad_{}", self.nodes.len());
        }
        self.name_if_unset(dy, format!("{}_DY", attr.name));
        self.name_if_unset(x, format!("{}_X", attr.name));
        log::debug!("adding conv wgrad node '{}' to graph", attr.name);
        let dw = self.output_tensor(format!("{}_DW", attr.name));
        attr.dy = Some(dy);
        attr.x = Some(x);
        attr.dw = Some(dw);
        self.nodes.push(Node::ConvWGrad(attr));
        dw
    }

    /// Adds an element-wise binary op; returns the OUT_0 tensor.
    pub fn pointwise(&mut self, in0: TensorId, in1: TensorId, attr: PointwiseAttr) -> TensorId {
        let mut attr = attr;
        if attr.name.is_empty() {
            attr.name = format!("pointwise_{}", self.nodes.len());
        }
        self.name_if_unset(in0, format!("{}_IN_0", attr.name));
        self.name_if_unset(in1, format!("{}_IN_1", attr.name));
        log::debug!("adding pointwise node '{}' to graph", attr.name);
        let out = self.output_tensor(format!("{}_OUT_0", attr.name));
        attr.in0 = Some(in0);
        attr.in1 = Some(in1);
        attr.out = Some(out);
        self.nodes.push(Node::Pointwise(attr));
        out
    }

    /// Adds a matrix multiplication; returns the C tensor.
    pub fn matmul(&mut self, a: TensorId, b: TensorId, attr: MatmulAttr) -> TensorId {
        let mut attr = attr;
        if attr.name.is_empty() {
            attr.name = format!("matmul_{}", self.nodes.len());
        }
        self.name_if_unset(a, format!("{}_A", attr.name));
        self.name_if_unset(b, format!("{}_B", attr.name));
        log::debug!("adding matmul node '{}' to graph", attr.name);
        let c = self.output_tensor(format!("{}_C", attr.name));
        attr.a = Some(a);
        attr.b = Some(b);
        attr.c = Some(c);
        self.nodes.push(Node::Matmul(attr));
        c
    }

    /// Validates the graph and infers missing tensor properties.
    ///
    /// Idempotent: a second call re-runs inference over the already-resolved
    /// records and rebuilds the sorted views.
    pub fn validate(&mut self) -> Result<()> {
        log::info!("validating graph '{}'", self.name());
        if self.name().is_empty() {
            return Err(Error::attribute_not_set("graph name not set"));
        }
        self.pre_validate_symbols()?;

        // Nodes are taken out for the walk so per-node inference can borrow
        // the tensor arena mutably; the first failure aborts the pass.
        let nodes = std::mem::take(&mut self.nodes);
        let mut outcome = Ok(());
        for node in &nodes {
            if let Err(err) = node.pre_validate(&self.tensors) {
                outcome = Err(err);
                break;
            }
            if let Err(err) = node.infer(&mut self.tensors, &self.context) {
                outcome = Err(err);
                break;
            }
            if let Err(err) = node.post_validate(&self.tensors) {
                outcome = Err(err);
                break;
            }
        }
        self.nodes = nodes;
        outcome?;

        // Inputs and outputs are checked after the node walk so node
        // inference had a chance to fill their missing properties first.
        for &id in &self.inputs {
            let tensor = self.tensors.get_mut(id);
            if !tensor.data_type().is_set() {
                let default = self.context.default_data_type(tensor.is_virtual());
                tensor.set_data_type(default);
            }
            self.tensors.get(id).validate()?;
        }
        for &id in &self.outputs {
            self.tensors.get(id).validate()?;
        }

        // Every user-visible output must be produced by some node.
        let produced: HashSet<TensorId> =
            self.nodes.iter().filter_map(|node| node.output_id()).collect();
        for (id, tensor) in self.tensors.iter() {
            if tensor.is_output() && !produced.contains(&id) {
                return Err(Error::invalid_attribute(format!(
                    "tensor '{}' is flagged as an output but no node produces it",
                    tensor.name()
                )));
            }
        }

        self.build_sorted_views();
        self.validated = true;
        log::info!("graph validation completed successfully");
        Ok(())
    }

    /// Unique tensor and node names; the emitted function is one SSA scope.
    fn pre_validate_symbols(&self) -> Result<()> {
        log::debug!("pre-validating graph '{}'", self.name());
        let mut used = HashSet::new();
        for &id in self.inputs.iter().chain(self.outputs.iter()) {
            let name = self.tensors.get(id).name();
            if name.is_empty() {
                return Err(Error::attribute_not_set("tensor name not set"));
            }
            if !used.insert(name.to_string()) {
                return Err(Error::invalid_attribute(format!(
                    "symbol name '{name}' already in use"
                )));
            }
        }
        for node in &self.nodes {
            if !used.insert(node.name().to_string()) {
                return Err(Error::invalid_attribute(format!(
                    "symbol name '{}' already in use",
                    node.name()
                )));
            }
        }
        Ok(())
    }

    /// Deterministic argument order for the emitter and the executor.
    fn build_sorted_views(&mut self) {
        let by_name = |tensors: &TensorArena, ids: &[TensorId], keep_virtual: bool| {
            let mut sorted: Vec<TensorId> = ids
                .iter()
                .copied()
                .filter(|&id| keep_virtual || !tensors.get(id).is_virtual())
                .collect();
            sorted.sort_by(|&a, &b| tensors.get(a).name().cmp(tensors.get(b).name()));
            sorted
        };
        self.sorted_inputs = by_name(&self.tensors, &self.inputs, true);
        self.sorted_outputs = by_name(&self.tensors, &self.outputs, false);
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn arena(&self) -> &TensorArena {
        &self.tensors
    }

    /// Non-virtual output tensors in ascending name order.
    pub fn sorted_outputs(&self) -> &[TensorId] {
        &self.sorted_outputs
    }

    /// Input tensors in ascending name order.
    pub fn sorted_inputs(&self) -> &[TensorId] {
        &self.sorted_inputs
    }

    /// Serializes the validated graph into the torch-dialect module text.
    pub fn emit_asm(&self) -> Result<String> {
        log::info!("emitting MLIR assembly for graph '{}'", self.name());
        if !self.validated {
            return Err(Error::not_validated(
                "graph must be validated before emitting MLIR assembly",
            ));
        }
        let asm = emitter::emit_graph(self)?;
        log::debug!("{asm}");
        Ok(asm)
    }

    /// Compiles the emitted module with the external compiler (or reuses the
    /// cached artifact) and opens the per-graph runtime session.
    ///
    /// Set `remove` to delete the cache files when this graph is dropped.
    pub fn compile(&mut self, handle: &Handle, remove: bool) -> Result<()> {
        log::info!("compiling graph '{}'", self.name());
        if !self.validated {
            return Err(Error::not_validated(
                "graph must be validated before being compiled",
            ));
        }
        let asm = self.emit_asm()?;
        let (artifact, _recompiled) = self.compiled_artifact(handle.backend(), &asm, remove)?;
        self.session = Some(Session::create(handle, &artifact)?);
        Ok(())
    }

    /// Returns the compiled artifact path, recompiling on a cache miss.
    ///
    /// Exposed for testing and debuggability; `compile()` is the intended
    /// entry point. The boolean is true when the cache was (re)generated.
    pub fn compiled_artifact(
        &mut self,
        backend: Backend,
        generated_asm: &str,
        remove: bool,
    ) -> Result<(PathBuf, bool)> {
        if self.cache_is_valid(backend, generated_asm)? {
            let cache = self.cache.as_ref().expect("validated cache missing");
            return Ok((cache.output.path().to_path_buf(), false));
        }
        let fresh = self.generate_compiled_artifact(backend, generated_asm, remove)?;
        let artifact = fresh.output.path().to_path_buf();
        if let Some(mut old) = self.cache.take() {
            // Same graph name means the fresh entry overwrote these paths;
            // disarm the old record so its drop cannot delete them.
            if old.input.path() == fresh.input.path() {
                old.disarm();
            }
        }
        self.cache = Some(fresh);
        Ok((artifact, true))
    }

    /// Cache hit requires: an entry from this instance, unchanged paths,
    /// byte-identical stored assembly, byte-identical stored command.
    fn cache_is_valid(&self, backend: Backend, generated_asm: &str) -> Result<bool> {
        log::debug!("validating compilation cache for graph '{}'", self.name());
        let Some(cache) = &self.cache else {
            log::debug!("cache not previously populated");
            return Ok(false);
        };
        let input_path = CacheFile::path_for(self.name(), CacheFileKind::Input)?;
        let output_path = CacheFile::path_for(self.name(), CacheFileKind::Output)?;
        let command_path = CacheFile::path_for(self.name(), CacheFileKind::Command)?;
        if cache.input.path() != input_path
            || cache.output.path() != output_path
            || cache.command.path() != command_path
        {
            log::debug!("cache paths differ");
            return Ok(false);
        }
        let Ok(stored_asm) = cache.input.read() else {
            log::debug!("cache input file unreadable");
            return Ok(false);
        };
        if stored_asm != generated_asm {
            log::debug!("generated assembly does not match");
            return Ok(false);
        }
        let command = cache::build_compile_command(
            backend,
            cache.input.path(),
            cache.output.path(),
            cache.statistics.path(),
        );
        let Ok(stored_command) = cache.command.read() else {
            log::debug!("cache command file unreadable");
            return Ok(false);
        };
        if stored_command != command {
            log::debug!("compile command does not match");
            return Ok(false);
        }
        Ok(true)
    }

    fn generate_compiled_artifact(
        &self,
        backend: Backend,
        generated_asm: &str,
        remove: bool,
    ) -> Result<CachedAssets> {
        log::info!("generating compiled artifacts for graph '{}'", self.name());
        let cache = CachedAssets::create(self.name(), remove)?;
        cache.input.write(generated_asm)?;
        let command = cache::build_compile_command(
            backend,
            cache.input.path(),
            cache.output.path(),
            cache.statistics.path(),
        );
        cache.command.write(&command)?;
        log::info!("compile command: {}", command.trim_end());
        cache::run_compile_command(&command)?;
        Ok(cache)
    }

    /// Reads back one of this graph's cache files.
    pub fn read_cache_file(&self, kind: CacheFileKind) -> Result<String> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            Error::compile_failure("no compilation cache has been generated for this graph")
        })?;
        cache.file(kind).read()
    }

    /// The compiler's self-reported counts for the cached artifact.
    pub fn compile_statistics(&self) -> Result<cache::CompileStatistics> {
        cache::parse_statistics(&self.read_cache_file(CacheFileKind::Statistics)?)
    }

    /// Runs the compiled module over the buffers in `pack`.
    ///
    /// Arguments are pushed in the emitted signature order (sorted outputs,
    /// then sorted inputs); after the call returns, one view per output is
    /// popped back into the pack slot.
    pub fn execute(&self, handle: &Handle, pack: &mut VariantPack<'_>) -> Result<()> {
        let session = self.session.as_ref().ok_or_else(|| {
            Error::not_validated("graph must be compiled before being executed")
        })?;
        session.check_handle(handle)?;
        log::info!("executing graph '{}'", self.name());

        let call = session.create_call(ENTRYPOINT)?;
        for &id in &self.sorted_outputs {
            let buffer = pack.get(id).ok_or_else(|| {
                Error::runtime_failure(format!(
                    "variant pack has no buffer for output tensor '{}'",
                    self.tensors.get(id).name()
                ))
            })?;
            call.push_input(buffer.raw_view())?;
        }
        for &id in &self.sorted_inputs {
            let buffer = pack.get(id).ok_or_else(|| {
                Error::runtime_failure(format!(
                    "variant pack has no buffer for input tensor '{}'",
                    self.tensors.get(id).name()
                ))
            })?;
            if buffer.is_empty() {
                return Err(Error::runtime_failure(format!(
                    "input tensor '{}' was given an empty buffer",
                    self.tensors.get(id).name()
                )));
            }
            call.push_input(buffer.raw_view())?;
        }
        call.invoke()?;
        for &id in &self.sorted_outputs {
            let view = call.pop_output()?;
            let buffer = pack
                .get_mut(id)
                .expect("output slot vanished between push and pop");
            buffer.adopt_view(session.api(), view);
        }
        Ok(())
    }
}
