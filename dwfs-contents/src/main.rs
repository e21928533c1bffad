use dwfs_contents::{ContentsConfig, ContentsManager, DwContents, GetOptions, ModelKind};
use dwfs_core::Content;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    List(String),
    Cat(String),
    Remove(String),
    Help,
}

fn parse_cli<I>(args: I) -> anyhow::Result<CliCommand>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let Some(command) = args.next() else {
        return Ok(CliCommand::Help);
    };
    if matches!(command.as_str(), "--help" | "-h") {
        return Ok(CliCommand::Help);
    }
    let path = args.next().unwrap_or_default();
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }
    match command.as_str() {
        "ls" => Ok(CliCommand::List(path)),
        "cat" => Ok(CliCommand::Cat(path)),
        "rm" if !path.is_empty() => Ok(CliCommand::Remove(path)),
        "rm" => anyhow::bail!("rm needs a path"),
        other => anyhow::bail!("unknown command: {other}"),
    }
}

/// Directories are listed with their children; anything else is described
/// without downloading its body.
fn list_options(is_directory: bool) -> GetOptions {
    if is_directory {
        GetOptions::with_content().kind(ModelKind::Directory)
    } else {
        GetOptions::metadata()
    }
}

fn print_usage() {
    println!("Usage: dwfs <command> [path]");
    println!("  ls [path]   Describe the directory or file at path as JSON");
    println!("  cat <path>  Print a file's content");
    println!("  rm <path>   Delete a file, directory or dataset");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = parse_cli(std::env::args())?;
    if command == CliCommand::Help {
        print_usage();
        return Ok(());
    }

    let config = ContentsConfig::from_env()?;
    let contents = DwContents::new(config.build_client()?, config.codec())
        .with_compatibility_mode(config.compatibility_mode);
    match command {
        CliCommand::List(path) => {
            let options = list_options(contents.dir_exists(&path).await?);
            let model = contents.get(&path, options).await?;
            println!("{}", serde_json::to_string_pretty(&model)?);
        }
        CliCommand::Cat(path) => {
            let model = contents.get(&path, GetOptions::with_content()).await?;
            match model.file_content() {
                Some(Content::Text(text)) => print!("{text}"),
                Some(Content::Base64(encoded)) => println!("{encoded}"),
                Some(Content::Json(value)) => println!("{}", serde_json::to_string_pretty(value)?),
                None => anyhow::bail!("{path} is not a file"),
            }
        }
        CliCommand::Remove(path) => {
            contents.delete(&path).await?;
            tracing::info!(path = %path, "deleted");
        }
        CliCommand::Help => {}
    }
    Ok(())
}
