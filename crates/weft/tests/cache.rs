#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use weft::{
    Backend, CacheFileKind, DataType, ErrorKind, Graph, PointwiseAttr, PointwiseMode, TensorAttr,
};

// Cache behavior depends on process environment (cache root, compiler
// binary); serialize the tests that touch it.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn unique_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("weft-cache-test-{tag}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Stub compiler: records each invocation, then writes the `-o` output.
fn write_stub_compiler(dir: &Path, fail: bool) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(if fail { "iree-compile-fail" } else { "iree-compile-ok" });
    let log = dir.join("invocations.log");
    let script = if fail {
        "#!/bin/sh\nexit 1\n".to_string()
    } else {
        format!(
            "#!/bin/sh\necho run >> \"{}\"\nout=\"\"\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-o\" ]; then shift; out=\"$1\"; fi\n  shift\ndone\necho artifact > \"$out\"\n",
            log.display()
        )
    };
    fs::write(&path, script).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn invocation_count(dir: &Path) -> usize {
    fs::read_to_string(dir.join("invocations.log"))
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

fn small_graph(name: &str) -> Graph {
    let mut graph = Graph::new();
    graph.set_name(name);
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
    let out = graph.pointwise(a, b, PointwiseAttr::new().with_mode(PointwiseMode::Add));
    graph.tensor_attr_mut(out).set_name("result").set_output(true);
    graph.validate().unwrap();
    graph
}

#[test]
fn second_compile_is_a_hit() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = unique_dir("hit");
    std::env::set_var("WEFT_CACHE_DIR", dir.join("cache"));
    std::env::set_var("WEFT_IREE_COMPILE", write_stub_compiler(&dir, false));

    let mut graph = small_graph("cache_hit_graph");
    let asm = graph.emit_asm().unwrap();

    let (first_path, recompiled) = graph
        .compiled_artifact(Backend::Cpu, &asm, false)
        .unwrap();
    assert!(recompiled);
    assert_eq!(invocation_count(&dir), 1);
    assert_eq!(fs::read_to_string(&first_path).unwrap(), "artifact\n");

    let (second_path, recompiled) = graph
        .compiled_artifact(Backend::Cpu, &asm, false)
        .unwrap();
    assert!(!recompiled, "unchanged graph must hit the cache");
    assert_eq!(second_path, first_path);
    assert_eq!(invocation_count(&dir), 1, "hit must not spawn the compiler");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn mutations_invalidate_the_cache() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = unique_dir("miss");
    std::env::set_var("WEFT_CACHE_DIR", dir.join("cache"));
    std::env::set_var("WEFT_IREE_COMPILE", write_stub_compiler(&dir, false));

    let mut graph = small_graph("cache_miss_graph");
    let asm = graph.emit_asm().unwrap();
    graph
        .compiled_artifact(Backend::Cpu, &asm, false)
        .unwrap();
    assert_eq!(invocation_count(&dir), 1);

    // Different assembly, same everything else.
    let changed_asm = asm.replace("add.Tensor", "mul.Tensor");
    let (_, recompiled) = graph
        .compiled_artifact(Backend::Cpu, &changed_asm, false)
        .unwrap();
    assert!(recompiled, "assembly change must miss");
    assert_eq!(invocation_count(&dir), 2);

    // Different backend flags, same assembly.
    let (_, recompiled) = graph
        .compiled_artifact(Backend::Gfx942, &changed_asm, false)
        .unwrap();
    assert!(recompiled, "backend change must miss");
    assert_eq!(invocation_count(&dir), 3);

    // Different graph name, therefore different cache paths.
    graph.set_name("cache_miss_graph_renamed");
    let (renamed_path, recompiled) = graph
        .compiled_artifact(Backend::Gfx942, &changed_asm, false)
        .unwrap();
    assert!(recompiled, "name change must miss");
    assert!(renamed_path
        .display()
        .to_string()
        .contains("cache_miss_graph_renamed"));
    assert_eq!(invocation_count(&dir), 4);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn remove_flag_cleans_cache_files_on_drop() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = unique_dir("remove");
    let cache_root = dir.join("cache");
    std::env::set_var("WEFT_CACHE_DIR", &cache_root);
    std::env::set_var("WEFT_IREE_COMPILE", write_stub_compiler(&dir, false));

    let entry_dir = cache_root.join("cache_remove_graph");
    {
        let mut graph = small_graph("cache_remove_graph");
        let asm = graph.emit_asm().unwrap();
        graph.compiled_artifact(Backend::Cpu, &asm, true).unwrap();
        assert!(entry_dir.join("iree-compile-input.mlir").exists());
        assert!(entry_dir.join("iree-compile-output.vmfb").exists());
        assert!(entry_dir.join("iree-compile-command.txt").exists());
    }
    assert!(
        !entry_dir.exists(),
        "auto-remove must leave no cache entry behind"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn persistent_cache_files_survive_but_new_instances_recompile() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = unique_dir("persist");
    let cache_root = dir.join("cache");
    std::env::set_var("WEFT_CACHE_DIR", &cache_root);
    std::env::set_var("WEFT_IREE_COMPILE", write_stub_compiler(&dir, false));

    let entry_dir = cache_root.join("cache_persist_graph");
    {
        let mut graph = small_graph("cache_persist_graph");
        let asm = graph.emit_asm().unwrap();
        graph.compiled_artifact(Backend::Cpu, &asm, false).unwrap();
    }
    assert!(entry_dir.join("iree-compile-output.vmfb").exists());
    assert_eq!(invocation_count(&dir), 1);

    // A new graph instance never trusts on-disk artifacts: the compiler may
    // have changed underneath them.
    let mut graph = small_graph("cache_persist_graph");
    let asm = graph.emit_asm().unwrap();
    let (_, recompiled) = graph
        .compiled_artifact(Backend::Cpu, &asm, false)
        .unwrap();
    assert!(recompiled);
    assert_eq!(invocation_count(&dir), 2);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn compile_failure_surfaces_and_preserves_previous_artifact() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = unique_dir("fail");
    std::env::set_var("WEFT_CACHE_DIR", dir.join("cache"));
    std::env::set_var("WEFT_IREE_COMPILE", write_stub_compiler(&dir, false));

    let mut graph = small_graph("cache_fail_graph");
    let asm = graph.emit_asm().unwrap();
    let (artifact, _) = graph
        .compiled_artifact(Backend::Cpu, &asm, false)
        .unwrap();

    // Swap in a compiler that always fails; the changed command forces a
    // regeneration attempt.
    std::env::set_var("WEFT_IREE_COMPILE", write_stub_compiler(&dir, true));
    let err = graph
        .compiled_artifact(Backend::Cpu, &asm, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CompileFailure);

    // The previously compiled artifact is still there and still readable
    // through the cache accessor.
    assert!(artifact.exists());
    assert_eq!(
        graph.read_cache_file(CacheFileKind::Output).unwrap(),
        "artifact\n"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn command_file_records_the_exact_invocation() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = unique_dir("command");
    std::env::set_var("WEFT_CACHE_DIR", dir.join("cache"));
    let stub = write_stub_compiler(&dir, false);
    std::env::set_var("WEFT_IREE_COMPILE", &stub);

    let mut graph = small_graph("cache_command_graph");
    let asm = graph.emit_asm().unwrap();
    graph.compiled_artifact(Backend::Cpu, &asm, false).unwrap();

    let command = graph.read_cache_file(CacheFileKind::Command).unwrap();
    assert!(command.starts_with(&stub.display().to_string()));
    assert!(command.contains("--iree-hal-target-backends=llvm-cpu"));
    assert!(command.contains("--iree-llvmcpu-target-cpu=host"));
    assert!(command.contains(" -o "));
    assert!(command.ends_with("iree-compile-output.vmfb\n"));
    assert_eq!(
        graph.read_cache_file(CacheFileKind::Input).unwrap(),
        asm,
        "stored input must be byte-identical to the emitted assembly"
    );

    let _ = fs::remove_dir_all(&dir);
}
