//! parlay: thin driver over parlay-core.
//!
//! Parses a script, resolves its parameters, and prints the dump JSON.
//! Presentation (tables, interactive help) belongs to the embedding
//! environment, not here.

use clap::{Parser, Subcommand};
use parlay_core::arguments::merge_decl_trees;
use parlay_core::{
    dump_arg_tree, parse_script, resolve_parameters, ArgNode, ArgTree, FileSystemLookup,
    ImportCache, NoBlueprints, ParamState, ParseContext, RawArgs, TargetParamError, Value,
};
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use std::process;

/// Script parameter resolution driver.
#[derive(Parser)]
#[command(name = "parlay", version, about = "Script parameter resolution driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a script's parameters and print the resolved-argument dump
    Resolve {
        /// Path to the script file
        script: PathBuf,
        /// Override a parameter: flattened name=value (JSON literal or bare string)
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
        /// Preset files whose args apply above the script's and below -p
        #[arg(long, value_name = "FILE")]
        preset: Vec<PathBuf>,
        /// Additional search roots for file lookups
        #[arg(long, value_name = "DIR")]
        root: Vec<PathBuf>,
        /// Skip blueprint expansion
        #[arg(long)]
        ignore_blueprints: bool,
    },
    /// Print a script's declaration dump
    Params {
        /// Path to the script file
        script: PathBuf,
        /// Advanced visibility level to include
        #[arg(long, default_value_t = 1)]
        advanced: i64,
        /// Additional search roots for file lookups
        #[arg(long, value_name = "DIR")]
        root: Vec<PathBuf>,
        /// Skip blueprint expansion
        #[arg(long)]
        ignore_blueprints: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            // stable, diffable output for the boundary contract
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        }
        Err(err) => {
            let map = err.into_map();
            eprintln!("{}", serde_json::to_string_pretty(&map).unwrap_or_default());
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<serde_json::Value, TargetParamError> {
    match cli.command {
        Commands::Resolve {
            script,
            params,
            preset,
            root,
            ignore_blueprints,
        } => {
            let lookup = lookup_for(&script, root);
            let cmdline = parse_overrides(&params)?;
            let mut cache = ImportCache::new();
            let mut ctx = ParseContext::new(&lookup, &NoBlueprints, &mut cache, &[]);
            let parsed = parse_script(&script, &mut ctx, cmdline.as_ref(), ignore_blueprints)?;
            let mut decls = parsed.params;
            let mut args = parsed.args;
            for file in &preset {
                let extra = parse_script(file, &mut ctx, cmdline.as_ref(), ignore_blueprints)?;
                decls = merge_decl_trees(decls, extra.params, "")?;
                apply_preset(&mut args, extra.args);
            }
            let resolved = resolve_parameters(&script, &mut decls, args, &lookup)?;
            Ok(dump_arg_tree(&resolved))
        }
        Commands::Params {
            script,
            advanced,
            root,
            ignore_blueprints,
        } => {
            let lookup = lookup_for(&script, root);
            let mut cache = ImportCache::new();
            let mut ctx = ParseContext::new(&lookup, &NoBlueprints, &mut cache, &[]);
            let parsed = parse_script(&script, &mut ctx, None, ignore_blueprints)?;
            Ok(parsed.params.dump(advanced))
        }
    }
}

fn lookup_for(script: &Path, mut roots: Vec<PathBuf>) -> FileSystemLookup {
    if let Some(dir) = script.parent() {
        roots.push(dir.to_owned());
    }
    roots.push(PathBuf::from("."));
    FileSystemLookup::new(roots)
}

/// Parse `-p name=value` overrides. Values decode as JSON literals, with a
/// bare-string fallback so `-p name=qsp` works without quoting.
fn parse_overrides(params: &[String]) -> Result<Option<RawArgs>, TargetParamError> {
    if params.is_empty() {
        return Ok(None);
    }
    let mut out = RawArgs::new();
    for entry in params {
        let (name, raw) = entry.split_once('=').ok_or_else(|| {
            TargetParamError::single(
                format!("malformed override '{}': expected name=value", entry),
                None,
                None,
            )
        })?;
        let value = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(json) => Value::from_json(&json)
                .map_err(|e| TargetParamError::single(e, Some(name), None))?,
            Err(_) => Value::Str(raw.to_owned()),
        };
        out.insert(name.to_owned(), value);
    }
    Ok(Some(out))
}

/// Merge preset args over the script's, without displacing command-line
/// values (which already sit in the tree with user state).
fn apply_preset(args: &mut ArgTree, preset: ArgTree) {
    for (key, node) in preset {
        match args.entry(key) {
            Entry::Vacant(e) => {
                e.insert(node);
            }
            Entry::Occupied(mut e) => match (e.get_mut(), node) {
                (ArgNode::Tree(sub), ArgNode::Tree(preset_sub)) => apply_preset(sub, preset_sub),
                (ArgNode::Leaf(existing), ArgNode::Leaf(from_preset)) => {
                    if existing.state != ParamState::User {
                        *existing = from_preset;
                    }
                }
                _ => {}
            },
        }
    }
}
