use clap::{Parser, Subcommand};
use oggcomment::{CommentFile, FieldStore, RewriteOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oggcomment", version, about = "Show and edit Ogg comment headers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the comment fields of one or more files
    Show {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Print a JSON object per file
        #[arg(long)]
        json: bool,
    },
    /// Set fields
    Set {
        file: PathBuf,
        /// KEY=VALUE; repeat a key to give it several values
        #[arg(short, long = "tag", value_name = "KEY=VALUE")]
        tags: Vec<String>,
        /// Add values instead of replacing existing ones
        #[arg(short, long)]
        append: bool,
        /// Replace the vendor string
        #[arg(long)]
        vendor: Option<String>,
        /// Merge fields from a JSON object of key → value(s)
        #[arg(long, value_name = "PATH")]
        from_json: Option<PathBuf>,
    },
    /// Remove the listed keys
    Delete {
        file: PathBuf,
        #[arg(required = true, num_args = 1..)]
        keys: Vec<String>,
    },
    /// Remove every field
    Clear {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Report whether each file has a readable comment header
    Exists {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    match Cli::parse().command {

        // ── Show ─────────────────────────────────────────────────────────────
        Commands::Show { files, json } => {
            for path in &files {
                let mut file = CommentFile::open(path);
                if json {
                    let fields = file.fields()?;
                    println!("{}", serde_json::json!({
                        "file":   path.display().to_string(),
                        "fields": fields,
                    }));
                } else {
                    let name = path.display().to_string();
                    println!("{}", name);
                    println!("{}", "-".repeat(name.chars().count()));
                    println!("{}", file.pretty_print());
                    println!();
                }
            }
        }

        // ── Set ──────────────────────────────────────────────────────────────
        Commands::Set { file, tags, append, vendor, from_json } => {
            let mut changes = parse_tags(&tags)?;
            if let Some(json) = from_json {
                let extra: FieldStore = serde_json::from_slice(&std::fs::read(json)?)?;
                changes.merge(extra);
            }
            let mut options = RewriteOptions::default();
            if let Some(vendor) = vendor {
                options = options.vendor(vendor);
            }

            let mut handle = CommentFile::with_options(&file, options);
            let written = handle.update(|fields| {
                for field in changes.iter() {
                    if append {
                        fields.add(field.key(), field.values());
                    } else {
                        fields.set(field.key(), field.values());
                    }
                }
            })?;
            println!("{}: {} fields written", file.display(), written.value_count());
        }

        // ── Delete ───────────────────────────────────────────────────────────
        Commands::Delete { file, keys } => {
            let mut handle = CommentFile::open(&file);
            let written = handle.update(|fields| {
                for key in &keys {
                    fields.remove(key);
                }
            })?;
            println!("{}: {} fields left", file.display(), written.value_count());
        }

        // ── Clear ────────────────────────────────────────────────────────────
        Commands::Clear { files } => {
            for path in &files {
                CommentFile::open(path).remove()?;
                println!("{}: cleared", path.display());
            }
        }

        // ── Exists ───────────────────────────────────────────────────────────
        Commands::Exists { files } => {
            for path in &files {
                let found = CommentFile::open(path).exists()?;
                println!("{}: {}", path.display(), if found { "yes" } else { "no" });
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Collect `KEY=VALUE` arguments; a key given twice gets both values.
fn parse_tags(tags: &[String]) -> Result<FieldStore, Box<dyn std::error::Error>> {
    let mut store = FieldStore::new();
    for tag in tags {
        let (key, value) = tag
            .split_once('=')
            .ok_or_else(|| format!("malformed tag '{}': expected KEY=VALUE", tag))?;
        if key.is_empty() {
            return Err(format!("malformed tag '{}': empty key", tag).into());
        }
        store.add(key, value);
    }
    Ok(store)
}
