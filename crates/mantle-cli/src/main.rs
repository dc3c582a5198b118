use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mantle")]
#[command(about = "Mantle - static analysis and introspection for build descriptions")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a project and emit its structure as JSON
    Introspect {
        source_root: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        compact: bool,

        #[arg(long, value_enum, default_value = "shared")]
        default_library: DefaultLibrary,

        #[arg(long, default_value = "subprojects")]
        subproject_dir: String,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Analyze a project and print a human-readable summary
    Summary {
        source_root: PathBuf,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Check that a single build file parses
    Validate {
        input: PathBuf,

        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DefaultLibrary {
    Shared,
    Static,
    Both,
}

impl From<DefaultLibrary> for mantle::LibraryKind {
    fn from(kind: DefaultLibrary) -> Self {
        match kind {
            DefaultLibrary::Shared => mantle::LibraryKind::Shared,
            DefaultLibrary::Static => mantle::LibraryKind::Static,
            DefaultLibrary::Both => mantle::LibraryKind::Both,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Introspect {
            source_root,
            output,
            compact,
            default_library,
            subproject_dir,
            verbose,
        } => cmd_introspect(
            source_root,
            output,
            compact,
            default_library,
            subproject_dir,
            verbose,
        ),
        Commands::Summary { source_root, verbose } => cmd_summary(source_root, verbose),
        Commands::Validate { input, verbose } => cmd_validate(input, verbose),
    }
}

fn analyze(
    source_root: &PathBuf,
    default_library: DefaultLibrary,
    subproject_dir: String,
) -> Result<mantle::IntrospectionResult> {
    let options = mantle::AnalysisOptions {
        default_library: default_library.into(),
        subproject_dir,
        ..mantle::AnalysisOptions::default()
    };
    mantle::introspect_root(source_root, options).map_err(Into::into)
}

fn cmd_introspect(
    source_root: PathBuf,
    output: Option<PathBuf>,
    compact: bool,
    default_library: DefaultLibrary,
    subproject_dir: String,
    verbose: bool,
) -> Result<()> {
    use colored::*;
    use std::fs;

    if verbose {
        println!("{}", " Mantle Introspection".bright_blue().bold());
        println!("{}", "=".repeat(50).bright_blue());
        println!(" Source root: {}", source_root.display());
        println!();
    }

    let result = analyze(&source_root, default_library, subproject_dir)?;

    let doc = serde_json::json!({
        "project": result.project,
        "targets": result.targets,
        "dependencies": result.dependencies,
    });
    let rendered = if compact {
        serde_json::to_string(&doc)?
    } else {
        serde_json::to_string_pretty(&doc)?
    };

    if let Some(output_path) = output {
        fs::write(&output_path, rendered)?;
        if verbose {
            println!(
                " {} Wrote introspection data to: {}",
                "SUCCESS:".bright_green().bold(),
                output_path.display()
            );
        }
    } else {
        println!("{rendered}");
    }

    Ok(())
}

fn cmd_summary(source_root: PathBuf, verbose: bool) -> Result<()> {
    use colored::*;

    let result = analyze(&source_root, DefaultLibrary::Shared, "subprojects".to_string())?;

    println!(
        "{}",
        format!(
            " Project: {} ({})",
            result.project.descriptive_name, result.project.version
        )
        .bright_green()
        .bold()
    );
    if !result.project.languages.is_empty() {
        println!(" Languages: {}", result.project.languages.join(", "));
    }
    if !result.project.subprojects.is_empty() {
        println!(" Subprojects: {}", result.project.subprojects.len());
        if verbose {
            for sub in &result.project.subprojects {
                match &sub.descriptive_name {
                    Some(name) => println!("   {} ({})", name, sub.name),
                    None => println!("   {} {}", sub.name, "(unanalyzable)".bright_red()),
                }
            }
        }
    }

    println!("\n Targets: {}", result.targets.len());
    for target in &result.targets {
        println!(
            "   {} {}",
            target.name.bright_yellow(),
            format!("({:?})", target.kind).normal()
        );
        if verbose {
            println!("     Defined in: {}", target.defined_in.display());
            println!("     Outputs: {}", target.outputs.join(", "));
            println!("     Sources: {}", target.sources.len());
        }
    }

    println!("\n Dependencies: {}", result.dependencies.len());
    for dep in &result.dependencies {
        let marker = match dep.required {
            Some(true) => "required".bright_red(),
            Some(false) => "optional".bright_cyan(),
            None => "required?".yellow(),
        };
        let cond = if dep.conditional { " [conditional]" } else { "" };
        println!("   {} ({marker}){cond}", dep.name.bright_yellow());
    }

    Ok(())
}

fn cmd_validate(input: PathBuf, verbose: bool) -> Result<()> {
    use colored::*;
    use std::fs;

    if verbose {
        println!("{}", " Validating build file".bright_cyan().bold());
        println!(" Input: {}", input.display());
        println!();
    }

    let content = fs::read_to_string(&input)?;
    let mut tree = mantle::SourceTree::new();

    match mantle::parse_into(&mut tree, &input, &content) {
        Ok(root) => {
            println!("{}", " VALID".bright_green().bold());
            if verbose {
                if let mantle::core::tree::Node::Block { statements } = tree.node(root) {
                    println!("   Parsed {} top-level statements", statements.len());
                }
            }
            Ok(())
        }
        Err(e) => {
            println!("{}", " INVALID".bright_red().bold());
            println!("\n{}", "Parse Error:".bright_red());
            println!("{e}");
            Err(anyhow::anyhow!("Validation failed"))
        }
    }
}
