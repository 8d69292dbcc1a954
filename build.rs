use std::env;
use std::process::Command;

// Toolchain facts the crate needs at compile time. CPU features are no longer
// probed here: kernels are compiled with `#[target_feature]` and selected at
// runtime, so the only build-time question is which intrinsics rustc exposes.
#[derive(PartialEq, Eq, Debug)]
struct Toolchain {
    channel: &'static str,
    minor: u32,
}

impl Toolchain {
    // AVX-512 intrinsics were stabilized in 1.89
    const AVX512_STABLE_MINOR: u32 = 89;

    fn detect() -> Toolchain {
        let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
        let version_info = Command::new(rustc)
            .args(["--version", "--verbose"])
            .output()
            .map(|output| String::from_utf8_lossy(&output.stdout).into_owned())
            .unwrap_or_default();

        let channel = if version_info.contains("nightly") {
            "nightly"
        } else {
            "stable"
        };

        Toolchain {
            channel,
            minor: Self::parse_minor(&version_info).unwrap_or(0),
        }
    }

    // "rustc 1.89.0 (29483883e 2025-08-04)" -> 89
    fn parse_minor(version_info: &str) -> Option<u32> {
        let version = version_info
            .lines()
            .next()?
            .split_whitespace()
            .nth(1)?;
        version.split('.').nth(1)?.parse().ok()
    }

    fn avx512_stable(&self) -> bool {
        self.minor >= Self::AVX512_STABLE_MINOR
    }

    fn avx512_available(&self) -> bool {
        self.avx512_stable() || self.channel == "nightly"
    }

    fn apply(&self) {
        let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
        let x86 = target_arch == "x86" || target_arch == "x86_64";

        // Create a flag for modules that can be used in nightly build only
        println!("cargo:rustc-cfg=rustc_channel=\"{}\"", self.channel);

        if x86 && self.avx512_available() {
            println!("cargo:rustc-cfg=avx512");
        }
        if self.avx512_stable() {
            println!("cargo:rustc-cfg=avx512_stable");
        }

        println!("cargo::rustc-check-cfg=cfg(rustc_channel, values(\"nightly\", \"stable\"))");
        println!("cargo::rustc-check-cfg=cfg(avx512)");
        println!("cargo::rustc-check-cfg=cfg(avx512_stable)");
        println!("cargo:rerun-if-env-changed=RUSTC");
    }
}

fn main() {
    Toolchain::detect().apply();
}
