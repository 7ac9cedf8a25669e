use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use kiln_backend_core::{BackendOptions, BackendRegistry};

/// kiln: WGSL compute and graphics shaders to SPIR-V
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input WGSL file
    input: PathBuf,

    /// Target backend (default: spirv)
    #[arg(short, long, default_value = "spirv")]
    target: String,

    /// Output path (default: input with a `.spv` extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// SPIR-V version to target, 1.0 through 1.6
    #[arg(long, default_value = "1.3", value_parser = parse_spirv_version)]
    spirv_version: (u8, u8),

    /// Do not emit OpName / OpMemberName debug instructions
    #[arg(long)]
    no_debug_names: bool,

    /// Dump IR to stderr before backend compilation
    #[arg(long)]
    emit_ir: bool,

    /// Parse and validate without producing output
    #[arg(long)]
    dry_run: bool,
}

fn parse_spirv_version(s: &str) -> Result<(u8, u8), String> {
    let invalid = || format!("invalid SPIR-V version '{s}', expected 1.0 through 1.6");
    let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
    match (major.parse::<u8>(), minor.parse::<u8>()) {
        (Ok(1), Ok(minor)) if minor <= 6 => Ok((1, minor)),
        _ => Err(invalid()),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    // 1. Read source file.
    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    // 2. Parse WGSL to IR.
    let module = kiln_parser::parse(&source)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("WGSL parse failed")?;

    // 3. Optionally dump IR to stderr.
    if cli.emit_ir {
        eprintln!("{}", kiln_ir::dump_module(&module));
    }

    // 4. Dry-run: stop here.
    if cli.dry_run {
        return Ok(());
    }

    // 5. Backend dispatch.
    let mut registry = BackendRegistry::new();
    registry.register(Box::new(kiln_backend_spirv::SpirvBackend));
    let backend = registry.find(&cli.target).ok_or_else(|| {
        let available = registry.list_targets().join(", ");
        miette::miette!("unknown target '{}' (available: {})", cli.target, available)
    })?;

    let opts = BackendOptions {
        spirv_version: cli.spirv_version,
        debug_names: !cli.no_debug_names,
    };

    let output = backend
        .compile(&module, &opts)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("backend compilation failed")?;

    // 6. Write output.
    for file in &output.files {
        let path = output_path(&cli, &file.name);
        std::fs::write(&path, file.to_bytes())
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        if let Some(header) = file.header() {
            eprintln!(
                "{}: SPIR-V {}.{}, id bound {}, {} words",
                path.display(),
                header.version.0,
                header.version.1,
                header.bound,
                file.words.len()
            );
        }
    }

    Ok(())
}

/// `--output` when given, else the input path with the file's extension.
fn output_path(cli: &Cli, file_name: &str) -> PathBuf {
    match &cli.output {
        Some(path) => path.clone(),
        None => {
            let extension = std::path::Path::new(file_name)
                .extension()
                .unwrap_or_default();
            cli.input.with_extension(extension)
        }
    }
}
