//! kemuri-cli/src/lib.rs — CLI lib pour Kemuri
//!
//! Sous-commandes :
//!   - build  : compile un programme Kemuri (fichier ou stdin) en `.class`
//!   - disasm : désassemble un `.class` façon `javap -c`
//!   - run    : exécute `main` d’un `.class` via l’évaluateur embarqué
//!
//! Config : defaults → ENV `KEMURI_*` → `--config kemuri.toml` → flags.

use std::fs;
use std::io::{self, Read, Write};

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{ArgAction, Parser, Subcommand};
use kemuri_compiler::{CliOverrides, Compiler, Config, WarningsAs};
use kemuri_core::runtime::eval::{run_main, EvalOptions};
use kemuri_core::ClassFile;
use log::{info, LevelFilter};

/// Point d’entrée du binaire (à appeler depuis src/main.rs)
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.cmd {
        Cmd::Build(args) => cmd_build(args),
        Cmd::Disasm { file } => cmd_disasm(&file),
        Cmd::Run { file, max_steps } => cmd_run(&file, max_steps),
    }
}

#[derive(Parser, Debug)]
#[command(name = "kemuri", version, about = "Compilateur Kemuri → classe JVM")]
struct Cli {
    /// Plus de logs (-v info, -vv debug, -vvv trace) ; `RUST_LOG` reste prioritaire
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compile un programme Kemuri en fichier .class
    Build(BuildArgs),
    /// Désassemble un fichier .class
    Disasm {
        file: Utf8PathBuf,
    },
    /// Exécute `main` d’un .class sans JVM
    Run {
        file: Utf8PathBuf,
        /// Limite d’instructions exécutées
        #[arg(long, default_value_t = 10_000_000)]
        max_steps: usize,
    },
}

#[derive(clap::Args, Debug)]
struct BuildArgs {
    /// Source Kemuri ; `-` ou absent → stdin
    input: Option<Utf8PathBuf>,

    /// Nom de classe pointé (défaut : nom du fichier capitalisé, ou `Main`)
    #[arg(long)]
    name: Option<String>,

    /// Répertoire de sortie (doit exister)
    #[arg(long, default_value = ".")]
    out_dir: Utf8PathBuf,

    /// Fichier de configuration TOML
    #[arg(long, env = "KEMURI_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Attribut SourceFile (défaut : nom du fichier d’entrée)
    #[arg(long)]
    source_file: Option<String>,

    /// Ignore les commandes inconnues sans avertir
    #[arg(long)]
    allow_unknown: bool,

    /// Plafond de commandes reconnues
    #[arg(long)]
    max_commands: Option<usize>,

    /// N’affiche pas le chemin écrit
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .format_timestamp(None)
        .try_init();
}

fn load_config(args: &BuildArgs) -> Result<Config> {
    layer_config(Config::from_env(), args)
}

/// Pose le TOML puis les flags sur `config` (defaults + ENV).
fn layer_config(mut config: Config, args: &BuildArgs) -> Result<Config> {
    if let Some(path) = &args.config {
        config.apply_toml_file(path).with_context(|| format!("lecture {path}"))?;
    }

    let overrides = CliOverrides {
        warnings: args.allow_unknown.then_some(WarningsAs::Allow),
        source_file: args.source_file.clone().or_else(|| {
            // défaut : nom du fichier d’entrée, sauf si déjà configuré
            match (&config.source_file, input_path(args)) {
                (None, Some(p)) => p.file_name().map(str::to_owned),
                _ => None,
            }
        }),
        max_commands: args.max_commands,
    };
    config.apply_cli_overrides(&overrides);
    Ok(config)
}

fn input_path(args: &BuildArgs) -> Option<&Utf8Path> {
    args.input.as_deref().filter(|p| p.as_str() != "-")
}

/// `hello-world.kmr` → `Hello_world` ; rien d’utilisable → `Main`.
fn default_class_name(input: Option<&Utf8Path>) -> String {
    let stem = input.and_then(Utf8Path::file_stem).unwrap_or("");
    let mut name = String::with_capacity(stem.len());
    for (i, c) in stem.chars().enumerate() {
        match c {
            _ if i == 0 && c.is_alphabetic() => name.extend(c.to_uppercase()),
            _ if c.is_alphanumeric() || c == '_' || c == '$' => name.push(c),
            _ if i > 0 => name.push('_'),
            _ => {}
        }
    }
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        "Main".to_owned()
    } else {
        name
    }
}

fn cmd_build(args: BuildArgs) -> Result<()> {
    let config = load_config(&args)?;
    let input = input_path(&args);
    let name = args.name.clone().unwrap_or_else(|| default_class_name(input));

    let source = match input {
        Some(path) => fs::read_to_string(path).with_context(|| format!("lecture {path}"))?,
        None => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s).context("lecture stdin")?;
            s
        }
    };

    let compiler = Compiler::new(config);
    let (path, compiled) = compiler
        .compile_to(source.chars(), &name, &args.out_dir)
        .with_context(|| format!("compilation de {name}"))?;

    // les commandes inconnues sont déjà journalisées par le compilateur
    let origin = input.map_or("<stdin>", Utf8Path::as_str);
    info!(target: "kemuri", "{origin} → {} ({} diagnostics)", path.display(), compiled.diagnostics.len());
    if !args.quiet {
        println!("{}", path.display());
    }
    Ok(())
}

fn read_class(file: &Utf8Path) -> Result<ClassFile> {
    if !file.is_file() {
        bail!("fichier introuvable: {file}");
    }
    let bytes = fs::read(file).with_context(|| format!("lecture {file}"))?;
    ClassFile::parse(&bytes).with_context(|| format!("classe invalide: {file}"))
}

fn cmd_disasm(file: &Utf8Path) -> Result<()> {
    let class = read_class(file)?;
    let listing = kemuri_core::disasm::disassemble(&class).context("désassemblage")?;
    print!("{listing}");
    Ok(())
}

fn cmd_run(file: &Utf8Path, max_steps: usize) -> Result<()> {
    let class = read_class(file)?;
    let opts = EvalOptions { max_steps: Some(max_steps), ..EvalOptions::default() };
    let out = run_main(&class, opts).with_context(|| format!("exécution de {file}"))?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(out.stdout_string().as_bytes())?;
    stdout.flush()?;
    info!(target: "kemuri", "{} instructions", out.steps);
    Ok(())
}
