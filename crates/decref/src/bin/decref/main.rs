mod cli;

use decref::declaration::Declaration;
use decref::fetch::FetchMode;
use decref::path::SourcePath;
use decref::postprocess::{self, ExpandOptions, Located, ShapeCheck};
use serde_json::Value;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("DECREF_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Resolve(resolve_cli) => resolve(resolve_cli),
        cli::Command::Expand(expand_cli) => expand(expand_cli),
        cli::Command::Process(process_cli) => process(process_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn resolve(cli: cli::ResolveCommand) -> anyhow::Result<()> {
    let declaration = load(&cli.input)?;
    let src = SourcePath::parse(&cli.from);

    let (resolved, node) = decref::path::resolve(&cli.path, &src, declaration.root())?;

    match cli.fetch {
        None => println!("{}", resolved.canonical()),
        Some(mode) => {
            let mode = match mode {
                cli::FetchModeArg::String => FetchMode::String,
                cli::FetchModeArg::Decode => FetchMode::Decode,
                cli::FetchModeArg::Object => FetchMode::Object,
            };
            let value = decref::fetch::fetch(&resolved, node, mode)?;
            output(&cli.output, &value.unwrap_or(Value::Null))?;
        }
    }

    Ok(())
}

pub fn expand(cli: cli::ExpandCommand) -> anyhow::Result<()> {
    let declaration = load(&cli.input)?;
    let src = SourcePath::parse(&cli.from);

    let expanded = decref::expand::expand(&cli.string, &src, declaration.root())?;
    for alert in &expanded.alerts {
        eprintln!("alert: {alert}");
    }
    println!("{}", expanded.text);

    Ok(())
}

pub fn process(cli: cli::ProcessCommand) -> anyhow::Result<()> {
    let mut declaration = load(&cli.input)?;
    let (pointers, expands) = load_locations(&cli.locations)?;

    postprocess::process_pointers(&mut declaration, &pointers, Some(&ShapeCheck))?;
    let options = ExpandOptions::new(!cli.no_expansion);
    let alerts = postprocess::process_expands(&mut declaration, &expands, &options)?;

    for (tag, raised_at) in &alerts {
        for location in raised_at {
            eprintln!("alert {tag} at {location}");
        }
    }

    output(&cli.output, declaration.root())?;
    Ok(())
}

fn load(input: &cli::InputArgs) -> anyhow::Result<Declaration> {
    let declaration = match &input.file {
        Some(file_path) => Declaration::load_file(file_path)?,
        None => Declaration::from_reader(std::io::stdin())?,
    };

    Ok(declaration)
}

/// One entry of the flagged-location file: a [Located] plus the tag kind
/// that flagged it.
#[derive(Debug, serde::Deserialize)]
struct TaggedLocated {
    kind: LocatedKind,
    #[serde(flatten)]
    location: Located,
}

#[derive(Debug, serde::Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum LocatedKind {
    Pointer,
    Expand,
}

fn load_locations(file_path: &std::path::Path) -> anyhow::Result<(Vec<Located>, Vec<Located>)> {
    let file_contents = std::fs::read_to_string(file_path)?;
    let entries: Vec<TaggedLocated> = serde_json::from_str(&file_contents)?;

    let (pointers, expands): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| entry.kind == LocatedKind::Pointer);

    Ok((
        pointers.into_iter().map(|entry| entry.location).collect(),
        expands.into_iter().map(|entry| entry.location).collect(),
    ))
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (decref-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    let declaration = load(&cli.input)?;

    match cli.command {
        cli::DevSubCommand::Declaration => println!("{declaration:#?}"),
        cli::DevSubCommand::Tenants => {
            for name in declaration.tenant_names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}
