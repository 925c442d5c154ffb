//! Target backends and the runtime bindings used to execute compiled
//! artifacts.

mod buffer;
mod handle;
mod runtime;
mod session;

pub use buffer::{Buffer, Element};
pub use handle::Handle;
pub use runtime::is_available;

pub(crate) use session::Session;

use std::fmt;

/// Target device family the generated kernels run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Host CPU through the local task executor.
    Cpu,
    /// AMD CDNA3 GPU (gfx942) through the HIP driver.
    Gfx942,
}

/// One registry row per backend. Display name, HAL driver and compiler
/// flags live side by side so adding a backend is a one-place change.
struct BackendSpec {
    name: &'static str,
    hal_driver: &'static str,
    compile_flags: &'static [&'static str],
}

impl Backend {
    fn spec(self) -> &'static BackendSpec {
        const CPU: BackendSpec = BackendSpec {
            name: "CPU",
            hal_driver: "local-task",
            compile_flags: &[
                "--iree-hal-target-backends=llvm-cpu",
                "--iree-llvmcpu-target-cpu=host",
            ],
        };
        const GFX942: BackendSpec = BackendSpec {
            name: "GFX942",
            hal_driver: "hip",
            compile_flags: &[
                "--iree-hal-target-backends=rocm",
                "--iree-hip-target=gfx942",
                "--iree-opt-level=O3",
            ],
        };
        match self {
            Backend::Cpu => &CPU,
            Backend::Gfx942 => &GFX942,
        }
    }

    /// HAL driver name passed to device creation.
    pub fn hal_driver(self) -> &'static str {
        self.spec().hal_driver
    }

    /// Fixed compiler flag vector for this target.
    pub fn compile_flags(self) -> &'static [&'static str] {
        self.spec().compile_flags
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rows_are_consistent() {
        assert_eq!(Backend::Cpu.hal_driver(), "local-task");
        assert_eq!(Backend::Gfx942.hal_driver(), "hip");
        assert!(Backend::Cpu
            .compile_flags()
            .contains(&"--iree-hal-target-backends=llvm-cpu"));
        assert!(Backend::Gfx942
            .compile_flags()
            .contains(&"--iree-hip-target=gfx942"));
        assert_eq!(Backend::Gfx942.to_string(), "GFX942");
    }
}
