use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use safeexec::Config;

/// Namespace and cgroup sandbox launcher.
#[derive(Parser, Debug)]
#[command(name = "safeexec", version)]
struct Cli {
    /// Path to read as the payload's stdin.
    #[arg(long)]
    stdin: Option<PathBuf>,

    /// Path to write the payload's stdout to.
    #[arg(long)]
    stdout: Option<PathBuf>,

    /// Path to write the payload's stderr to.
    #[arg(long)]
    stderr: Option<PathBuf>,

    /// Existing empty directory used as the overlay mount point and pivot target.
    #[arg(long)]
    rootfs: PathBuf,

    /// Overlay lowerdir.
    #[arg(long)]
    overlay_lowerdir: PathBuf,

    /// Overlay upperdir.
    #[arg(long)]
    overlay_upperdir: PathBuf,

    /// Overlay workdir.
    #[arg(long)]
    overlay_workdir: PathBuf,

    /// Initial working directory inside the sandbox.
    #[arg(long, default_value = "/")]
    workdir: PathBuf,

    /// Environment variable for the payload, as KEY=VALUE. Repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Host-visible cgroup v2 directory the launcher owns.
    #[arg(long)]
    cgroup_path: PathBuf,

    /// Wall-clock time limit, in milliseconds.
    #[arg(long)]
    time_limit: u64,

    /// Memory limit, in bytes.
    #[arg(long)]
    memory_limit: u64,

    /// Path to write the final report to.
    #[arg(long)]
    report: Option<PathBuf>,

    /// The payload's argument vector; the first value is the executable.
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

/// Opens the configured stdio redirections (if any) and assembles `Config`.
///
/// Opening happens here, before the child is ever cloned, so a missing or
/// unwritable redirect target is an ordinary configuration error rather
/// than a failure surfacing from deep inside the child's pivoted filesystem
/// view.
fn build_config(cli: Cli) -> Result<Config, std::io::Error> {
    let stdin = cli.stdin.map(std::fs::File::open).transpose()?;
    let stdout = cli.stdout.map(std::fs::File::create).transpose()?;
    let stderr = cli.stderr.map(std::fs::File::create).transpose()?;
    Ok(Config {
        stdin,
        stdout,
        stderr,
        rootfs: cli.rootfs,
        overlay_lowerdir: cli.overlay_lowerdir,
        overlay_upperdir: cli.overlay_upperdir,
        overlay_workdir: cli.overlay_workdir,
        workdir: cli.workdir,
        args: cli.command,
        environ: cli.env,
        cgroup_path: cli.cgroup_path,
        memory_limit: cli.memory_limit,
        time_limit: cli.time_limit,
        report: cli.report,
    })
}

fn main() -> ExitCode {
    safeexec::logging::init();

    let cli = Cli::parse();
    let config = match build_config(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: cannot open configured stdio redirection: {err}");
            return ExitCode::FAILURE;
        }
    };

    match safeexec::run(config) {
        Ok(report) => {
            tracing::info!(
                time_ms = report.time_ms,
                memory_bytes = report.memory_bytes,
                exit_code = report.exit_code,
                "run complete"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
