use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Build the trace runtime as static and shared libraries for linking
    /// into instrumented programs
    BuildRuntime {
        #[arg(long)]
        release: bool,
        /// Cross-compilation target triple
        #[arg(long)]
        target: Option<String>,
        /// Copy the built libraries here
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildRuntime { release, target, out_dir } => {
            build_runtime(release, target.as_deref(), out_dir.as_deref())?;
        }
    }

    Ok(())
}

const RUNTIME_LIBS: [&str; 2] = ["libbbtrace_runtime.a", "libbbtrace_runtime.so"];

fn build_runtime(release: bool, target: Option<&str>, out_dir: Option<&Path>) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("build").arg("--package").arg("bbtrace-runtime");
    if release {
        cmd.arg("--release");
    }
    if let Some(target) = target {
        cmd.arg("--target").arg(target);
    }

    let status = cmd.status().context("Failed to run cargo")?;
    if !status.success() {
        anyhow::bail!("Failed to build bbtrace-runtime");
    }

    let profile = if release { "release" } else { "debug" };
    let mut built = PathBuf::from("target");
    if let Some(target) = target {
        built.push(target);
    }
    built.push(profile);

    println!("✓ bbtrace-runtime built successfully");
    println!("  Profile: {profile}");
    for lib in RUNTIME_LIBS {
        println!("  {}", built.join(lib).display());
    }

    if let Some(out_dir) = out_dir {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;
        for lib in RUNTIME_LIBS {
            let from = built.join(lib);
            std::fs::copy(&from, out_dir.join(lib))
                .with_context(|| format!("Failed to copy {}", from.display()))?;
        }
        println!("  Copied to {}", out_dir.display());
    }

    Ok(())
}
