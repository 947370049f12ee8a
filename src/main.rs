//! rulebook: inspect how a rulebook configuration resolves.
//!
//! Reads the embedded defaults, the user config (`~/.config/rulebook/config.toml`)
//! or the file given with `--config`, and prints what each rule name resolves to.
//!
//! Usage:
//!   rulebook [--config PATH] [-v] resolve NAME...
//!   rulebook specificity PATTERN...

use rulebook::config::{PartialRulebookConfig, RulebookConfig, Verboseness};
use rulebook::pattern::specificity;
use rulebook::resolve::ConfigResolver;
use rulebook::rule::text::validate_name;
use rulebook::{Required, logging};
use serde_json::json;

const USAGE: &str = "\
usage: rulebook [--config PATH] [-v] resolve NAME...
       rulebook specificity PATTERN...";

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    verbose: bool,
    command: Vec<String>,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut args = Args::default();
    let mut raw = raw.into_iter();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                args.config = Some(raw.next().ok_or("--config requires a path")?);
            }
            "--verbose" | "-v" => args.verbose = true,
            _ => args.command.push(arg),
        }
    }
    Ok(args)
}

/// Load the layered config: defaults, then the config file if any.
fn load_config(path: Option<&str>) -> rulebook::Result<RulebookConfig> {
    let file = match path {
        Some(path) => Some(PartialRulebookConfig::load(path)?),
        None => RulebookConfig::user_config_path()
            .map(|p| PartialRulebookConfig::load(p.to_string_lossy()))
            .transpose()?,
    };
    Ok(RulebookConfig::layered(file, PartialRulebookConfig::new()))
}

fn resolve(args: &Args, names: &[String]) -> rulebook::Result<()> {
    let config = load_config(args.config.as_deref())?;
    logging::init(if args.verbose {
        Verboseness::Debug
    } else {
        config.verboseness
    });

    let resolver = ConfigResolver::new(config)?;
    for name in names {
        let name = validate_name(name)?;
        let mut parsed = resolver.get(name);
        resolver.resolve_action(name, &mut parsed)?;
        let required = parsed.required(name)?;
        let output = json!({
            "name": name,
            "pattern": parsed.is_match().then_some(&parsed.name),
            "specificity": parsed.specificity,
            "required": required.map(Required::as_str),
            "action": parsed.throw_action.map(|a| a.as_str()),
            "config": parsed.public(),
        });
        println!("{output:#}");
    }
    Ok(())
}

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("rulebook: {e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let result = match args.command.split_first() {
        Some((cmd, names)) if cmd == "resolve" && !names.is_empty() => resolve(&args, names),
        Some((cmd, patterns)) if cmd == "specificity" && !patterns.is_empty() => {
            for pattern in patterns {
                println!("{}\t{pattern}", specificity(pattern));
            }
            Ok(())
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("rulebook: {e}");
        std::process::exit(1);
    }
}
