//! One-time CPU capability probe.
//!
//! Kernels are compiled per instruction set with `#[target_feature]` and
//! chosen at runtime. The probe runs once per process, on first use, and the
//! resulting [`Capabilities`] never changes afterwards.

use std::fmt;
use std::sync::OnceLock;

/// Instruction-set families a kernel variant can require.
///
/// Ordered from least to most capable within each architecture, so the
/// registry can prefer the highest supported level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Isa {
    Scalar,
    Sse,
    Avx,
    Fma3,
    Avx512f,
    Neon,
    NeonFma,
    WasmSimd,
}

impl Isa {
    pub const ALL: [Isa; 8] = [
        Isa::Scalar,
        Isa::Sse,
        Isa::Avx,
        Isa::Fma3,
        Isa::Avx512f,
        Isa::Neon,
        Isa::NeonFma,
        Isa::WasmSimd,
    ];

    /// Lower-case name used in kernel names and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Isa::Scalar => "scalar",
            Isa::Sse => "sse",
            Isa::Avx => "avx",
            Isa::Fma3 => "fma3",
            Isa::Avx512f => "avx512f",
            Isa::Neon => "neon",
            Isa::NeonFma => "neonfma",
            Isa::WasmSimd => "wasmsimd",
        }
    }

    /// Parses a name produced by [`Isa::name`].
    pub fn from_name(name: &str) -> Option<Isa> {
        Isa::ALL
            .into_iter()
            .find(|isa| isa.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Instruction sets available on the running CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub sse: bool,
    pub avx: bool,
    pub fma3: bool,
    pub avx512f: bool,
    pub neon: bool,
    pub neon_fma: bool,
    pub wasm_simd: bool,
}

impl Capabilities {
    /// Probes the running CPU.
    pub fn detect() -> Capabilities {
        let capabilities = Self::probe();
        log::debug!("detected CPU capabilities: {capabilities}");
        capabilities
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn probe() -> Capabilities {
        let avx = is_x86_feature_detected!("avx");
        Capabilities {
            sse: is_x86_feature_detected!("sse2"),
            avx,
            fma3: avx && is_x86_feature_detected!("fma"),
            avx512f: is_x86_feature_detected!("avx512f"),
            ..Capabilities::default()
        }
    }

    #[cfg(target_arch = "aarch64")]
    fn probe() -> Capabilities {
        // NEON and FMA are part of the AArch64 baseline.
        let neon = std::arch::is_aarch64_feature_detected!("neon");
        Capabilities {
            neon,
            neon_fma: neon,
            ..Capabilities::default()
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn probe() -> Capabilities {
        Capabilities {
            wasm_simd: cfg!(target_feature = "simd128"),
            ..Capabilities::default()
        }
    }

    #[cfg(not(any(
        target_arch = "x86",
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "wasm32"
    )))]
    fn probe() -> Capabilities {
        Capabilities::default()
    }

    /// Whether kernels requiring `isa` can run on this CPU.
    pub fn supports(&self, isa: Isa) -> bool {
        match isa {
            Isa::Scalar => true,
            Isa::Sse => self.sse,
            Isa::Avx => self.avx,
            Isa::Fma3 => self.fma3,
            Isa::Avx512f => self.avx512f,
            Isa::Neon => self.neon,
            Isa::NeonFma => self.neon_fma,
            Isa::WasmSimd => self.wasm_simd,
        }
    }

    /// Every supported instruction set, scalar included.
    pub fn supported(&self) -> Vec<Isa> {
        Isa::ALL
            .into_iter()
            .filter(|&isa| self.supports(isa))
            .collect()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.supported().into_iter().map(Isa::name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Process-wide capabilities, probed on first call.
pub fn capabilities() -> &'static Capabilities {
    CAPABILITIES.get_or_init(Capabilities::detect)
}
