//! `igemm-conformance`: sweeps every compiled IGEMM kernel through every
//! edge-case category on the running CPU.

use std::process::ExitCode;

use clap::Parser;

use igemm::conformance::EdgeCase;
use igemm::tester::{TestOutcome, DEFAULT_SEED};
use igemm::{capabilities, igemm_minmax_microkernels, IgemmKernel, IgemmMicrokernel, Isa};

#[derive(Parser, Debug)]
#[command(name = "igemm-conformance")]
#[command(version, about = "Conformance sweep for f32 IGEMM minmax microkernels", long_about = None)]
struct Cli {
    /// Only kernels whose name contains this substring
    #[arg(short, long)]
    kernel: Option<String>,

    /// Only kernels for this instruction set (scalar, sse, avx, fma3, avx512f, neon, neonfma, wasmsimd)
    #[arg(long, value_parser = parse_isa)]
    isa: Option<Isa>,

    /// Random rounds per configuration
    #[arg(short, long, default_value = "3")]
    iterations: usize,

    /// Seed for the input generator
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// List the selected kernels and exit
    #[arg(long)]
    list: bool,
}

fn parse_isa(name: &str) -> Result<Isa, String> {
    Isa::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = Isa::ALL.iter().map(|isa| isa.name()).collect();
        format!("unknown ISA '{name}', expected one of: {}", known.join(", "))
    })
}

fn selected<'a>(cli: &'a Cli) -> impl Iterator<Item = &'static IgemmMicrokernel> + 'a {
    igemm_minmax_microkernels().iter().filter(move |kernel| {
        cli.kernel
            .as_deref()
            .map_or(true, |pattern| kernel.name.contains(pattern))
            && cli.isa.map_or(true, |isa| kernel.isa == isa)
    })
}

#[derive(Debug, Default)]
struct Tally {
    passed: usize,
    skipped: usize,
    failed: usize,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    println!(
        "igemm conformance, {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!("cpu: {}", capabilities());
    println!("iterations: {}, seed: {:#x}", cli.iterations, cli.seed);
    println!();

    if cli.list {
        for kernel in selected(&cli) {
            println!(
                "{:<56} {:<9} mr={} nr={} kr={} sr={} {}",
                kernel.name,
                kernel.isa,
                kernel.mr,
                kernel.nr,
                kernel.kr,
                kernel.sr,
                if kernel.is_supported() { "supported" } else { "unsupported" }
            );
        }
        return ExitCode::SUCCESS;
    }

    let mut tally = Tally::default();
    for kernel in selected(&cli) {
        if !kernel.is_supported() {
            println!("SKIP {} ({} unavailable)", kernel.name, kernel.isa);
            tally.skipped += EdgeCase::ALL.len();
            continue;
        }

        let mut failures = Vec::new();
        for case in EdgeCase::ALL {
            let outcome = case.run_with(kernel, |tester| {
                tester.iterations(cli.iterations).seed(cli.seed)
            });
            match outcome {
                Ok(TestOutcome::Passed) => tally.passed += 1,
                Ok(TestOutcome::Skipped { .. }) => tally.skipped += 1,
                Err(error) => {
                    tally.failed += 1;
                    failures.push(format!("  {case}: {error}"));
                }
            }
        }

        if failures.is_empty() {
            println!("PASS {}", kernel.name);
        } else {
            println!("FAIL {}", kernel.name);
            for failure in &failures {
                println!("{failure}");
            }
        }
    }

    println!();
    println!(
        "{} passed, {} failed, {} skipped",
        tally.passed, tally.failed, tally.skipped
    );

    if tally.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
