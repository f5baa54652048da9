use clap::{ArgAction, Parser, Subcommand};
use star::archive::Archive;
use star::report::{Reporter, Verbosity};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "star", about = "The .star archive container CLI")]
struct Cli {
    /// Raise verbosity: -v simple reports, -vv detailed reports
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new archive from the given member files
    Create {
        archive: PathBuf,
        #[arg(required = true)]
        members: Vec<PathBuf>,
    },
    /// Extract one member, or every active member
    Extract {
        archive: PathBuf,
        member: Option<String>,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// List active members
    List {
        archive: PathBuf,
        /// Emit the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace members with new versions of the given files
    Update {
        archive: PathBuf,
        #[arg(required = true)]
        members: Vec<PathBuf>,
    },
    /// Add member files to an existing archive
    Append {
        archive: PathBuf,
        #[arg(required = true)]
        members: Vec<PathBuf>,
    },
    /// Defragment the archive, dropping deleted members and reclaiming space
    Pack {
        archive: PathBuf,
    },
    /// Mark a member deleted without rewriting the archive
    Delete {
        archive: PathBuf,
        member: String,
    },
    /// Show the free-space table
    Spaces {
        archive: PathBuf,
        /// Emit the table as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let reporter = Reporter::new(Verbosity::from_count(cli.verbose));

    match cli.command {
        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create { archive, members } => {
            let (_ar, report) = Archive::create(&archive, &members, reporter)?;
            for name in &report.written {
                println!("  added   {}", name);
            }
            for (path, err) in &report.skipped {
                eprintln!("  skipped {} ({})", path.display(), err);
            }
            println!("Created: {}", archive.display());
            if !report.is_complete() {
                std::process::exit(1);
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { archive, member, output_dir } => {
            let mut ar = Archive::open_with(&archive, reporter)?;
            match member {
                Some(name) => {
                    let target = ar.extract(&name, &output_dir)?;
                    println!("Extracted: {}", target.display());
                }
                None => {
                    let written = ar.extract_all(&output_dir)?;
                    println!("Extracted {} member(s) to: {}", written.len(), output_dir.display());
                }
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { archive, json } => {
            let mut ar = Archive::open_with(&archive, reporter)?;
            let members = ar.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&members)?);
            } else {
                println!("Archive: {}", archive.display());
                println!("{:<26} {:>12} {:>12}", "Name", "Size", "Offset");
                for info in &members {
                    println!("{:<26} {:>12} {:>12}", info.name, info.file_size, info.start_position);
                }
            }
        }

        // ── Update ───────────────────────────────────────────────────────────
        Commands::Update { archive, members } => {
            let mut ar = Archive::open_with(&archive, reporter)?;
            for member in &members {
                ar.update_path(member)?;
                println!("  updated {}", member.display());
            }
        }

        // ── Append ───────────────────────────────────────────────────────────
        Commands::Append { archive, members } => {
            let mut ar = Archive::open_with(&archive, reporter)?;
            for member in &members {
                ar.append_path(member)?;
                println!("  added   {}", member.display());
            }
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { archive } => {
            let mut ar = Archive::open_with(&archive, reporter)?;
            let outcome = ar.pack()?;
            println!(
                "Packed: kept {} member(s), reclaimed {} bytes",
                outcome.records_kept, outcome.bytes_reclaimed
            );
        }

        // ── Delete ───────────────────────────────────────────────────────────
        Commands::Delete { archive, member } => {
            let mut ar = Archive::open_with(&archive, reporter)?;
            ar.delete(&member)?;
            println!("Deleted: {}", member);
        }

        // ── Spaces ───────────────────────────────────────────────────────────
        Commands::Spaces { archive, json } => {
            let ar = Archive::open_with(&archive, reporter)?;
            let spaces = ar.free_spaces().to_vec();
            if json {
                println!("{}", serde_json::to_string_pretty(&spaces)?);
            } else {
                println!("Free spaces in {}:", archive.display());
                println!("{:>12} {:>12}", "Offset", "Size");
                for range in &spaces {
                    println!("{:>12} {:>12}", range.start, range.size);
                }
            }
        }
    }

    Ok(())
}
