mod logging;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use statekeep_core::{xml, BlockUpdate, ComponentScope, PathTemplate, StateTree, StorageDocument};
use statekeep_storage::{write_atomic, PathRoots, StorageConfig};
use walkdir::WalkDir;

const DOCUMENT_ROOTS: [&str; 3] = ["application", "project", "module"];

#[derive(Parser)]
#[command(
    name = "statekeep",
    about = "Inspect and maintain persisted component state documents",
    author,
    version
)]
struct Cli {
    /// 顯示更多日誌（可重複）。 / Increase log verbosity (repeatable).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// 僅顯示錯誤。 / Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 顯示狀態文件或單一元件區塊。 / Print a state document or one component block.
    Show(ShowArgs),
    /// 列出文件中的元件。 / List the component blocks of a document.
    List(FileArg),
    /// 移除元件區塊。 / Remove one component block from a document.
    Remove(RemoveArgs),
    /// 掃描資料夾內的狀態文件。 / Report every state document below a directory.
    Scan(ScanArgs),
    /// 展開路徑樣板。 / Expand a storage path template.
    Resolve(ResolveArgs),
}

#[derive(Args)]
struct FileArg {
    /// 狀態文件路徑。 / Path to the state document.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(Args)]
struct ShowArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// 只顯示指定元件。 / Only print the block of this component.
    #[arg(long, short = 'c', value_name = "NAME")]
    component: Option<String>,
}

#[derive(Args)]
struct RemoveArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// 要移除的元件名稱。 / Name of the component whose block is removed.
    #[arg(value_name = "NAME")]
    name: String,
    /// 暫存檔副檔名。 / Suffix of the temporary used for the atomic replace.
    #[arg(long, default_value = "tmp", value_name = "SUFFIX")]
    temp_suffix: String,
}

#[derive(Args)]
struct ScanArgs {
    /// 要掃描的資料夾。 / Directory to walk.
    #[arg(value_name = "DIR")]
    dir: PathBuf,
}

#[derive(Args)]
struct ResolveArgs {
    /// 例如 `$APP_CONFIG$/ui.xml`。 / A template such as `$APP_CONFIG$/ui.xml`.
    #[arg(value_name = "TEMPLATE")]
    template: String,
    /// 儲存設定檔；略過時以目前目錄為根。 / Storage config; the current directory is used as base when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        verbose,
        quiet,
        command,
    } = Cli::parse();
    logging::init_logging(logging::level_for(verbose, quiet))?;

    match command {
        Commands::Show(args) => execute_show(args),
        Commands::List(args) => execute_list(args),
        Commands::Remove(args) => execute_remove(args),
        Commands::Scan(args) => execute_scan(args),
        Commands::Resolve(args) => execute_resolve(args),
    }
}

fn load_document(path: &Path) -> Result<StateTree> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    xml::parse(&text).with_context(|| format!("malformed state document {}", path.display()))
}

fn execute_show(args: ShowArgs) -> Result<()> {
    let document = load_document(&args.file)?;
    let tree = match args.component.as_deref() {
        Some(name) => StorageDocument::find_block(&document, name).ok_or_else(|| {
            anyhow!("component '{name}' not found in {}", args.file.display())
        })?,
        None => &document,
    };
    println!("{}", xml::to_string(tree)?);
    Ok(())
}

fn execute_list(args: FileArg) -> Result<()> {
    let document = load_document(&args.file)?;
    for name in StorageDocument::component_names(&document) {
        println!("{name}");
    }
    Ok(())
}

fn execute_remove(args: RemoveArgs) -> Result<()> {
    let document = load_document(&args.file)?;
    if StorageDocument::find_block(&document, &args.name).is_none() {
        bail!(
            "component '{}' not found in {}",
            args.name,
            args.file.display()
        );
    }

    let scope = document_scope(&document);
    let update = BlockUpdate {
        component: args.name.clone(),
        block: None,
    };
    let Some(remaining) = StorageDocument::merge(Some(document), scope, vec![update]) else {
        fs::remove_file(&args.file)
            .with_context(|| format!("failed to delete {}", args.file.display()))?;
        tracing::info!(file = %args.file.display(), "last block removed; document deleted");
        println!(
            "Removed '{}'; deleted empty {}",
            args.name,
            args.file.display()
        );
        return Ok(());
    };

    let text = xml::to_document(&remaining)?;
    write_atomic(&args.file, text.as_bytes(), &args.temp_suffix)
        .with_context(|| format!("failed to write {}", args.file.display()))?;
    tracing::info!(file = %args.file.display(), component = %args.name, "block removed");
    println!("Removed '{}' from {}", args.name, args.file.display());
    Ok(())
}

fn document_scope(document: &StateTree) -> ComponentScope {
    match document.name() {
        "project" => ComponentScope::Project,
        "module" => ComponentScope::Module,
        _ => ComponentScope::Application,
    }
}

fn execute_scan(args: ScanArgs) -> Result<()> {
    if !args.dir.is_dir() {
        bail!("{} is not a directory", args.dir.display());
    }

    let mut documents = 0usize;
    let mut malformed = 0usize;
    for entry in WalkDir::new(&args.dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("xml") {
            continue;
        }

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read file");
                continue;
            }
        };
        match xml::parse(&text) {
            Ok(document) if DOCUMENT_ROOTS.contains(&document.name()) => {
                documents += 1;
                let names = StorageDocument::component_names(&document);
                if names.is_empty() {
                    println!("{}: (no components)", path.display());
                } else {
                    println!("{}: {}", path.display(), names.join(", "));
                }
            }
            Ok(document) => {
                tracing::debug!(path = %path.display(), root = document.name(), "not a state document");
            }
            Err(err) => {
                malformed += 1;
                println!("{}: malformed ({err})", path.display());
            }
        }
    }

    println!("Scanned {documents} state document(s), {malformed} malformed");
    Ok(())
}

fn execute_resolve(args: ResolveArgs) -> Result<()> {
    let template = PathTemplate::parse(&args.template)
        .with_context(|| format!("invalid template '{}'", args.template))?;
    let roots = match args.config.as_deref() {
        Some(path) => StorageConfig::load(path)?.paths,
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            PathRoots::under(cwd)
        }
    };
    let path = roots.expand(&template)?;
    println!("{}", path.display());
    Ok(())
}
