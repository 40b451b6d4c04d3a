//! Vista command line tool
//!
//! ```text
//! vista [--config <file>] inspect <scene.json>
//! vista [--config <file>] create <name> <scene.json>
//! vista [--config <file>] convert <in.json> <out.json>
//! vista [--config <file>] sync-demo
//! ```

mod commands;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use vista_services::ServiceConfig;

use crate::commands::Command;

const USAGE: &str = "usage: vista [--config <file>] <inspect <file> | create <name> <file> | convert <in> <out> | sync-demo>";

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config_path, command) = match parse_args(std::env::args().skip(1)) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    let config = match ServiceConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match commands::run(command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{} ({})", e, e.kind());
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<(Option<PathBuf>, Command), String> {
    let mut config = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Err("vista - inspect and edit scene documents".to_string()),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("inspect") => Command::Inspect {
            file: positional.next().ok_or("inspect needs a file")?.into(),
        },
        Some("create") => Command::Create {
            name: positional.next().ok_or("create needs a name")?,
            file: positional.next().ok_or("create needs a file")?.into(),
        },
        Some("convert") => Command::Convert {
            input: positional.next().ok_or("convert needs an input file")?.into(),
            output: positional.next().ok_or("convert needs an output file")?.into(),
        },
        Some("sync-demo") => Command::SyncDemo,
        Some(other) => return Err(format!("unknown command '{}'", other)),
        None => return Err("no command given".to_string()),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument '{}'", extra));
    }
    Ok((config, command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_commands() {
        let (config, command) = parse_args(args(&["inspect", "a.json"])).unwrap();
        assert!(config.is_none());
        assert_eq!(command, Command::Inspect { file: "a.json".into() });

        let (config, command) =
            parse_args(args(&["--config", "v.toml", "convert", "a.json", "b.json"])).unwrap();
        assert_eq!(config, Some(PathBuf::from("v.toml")));
        assert_eq!(
            command,
            Command::Convert {
                input: "a.json".into(),
                output: "b.json".into()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["create", "Project"])).is_err());
        assert!(parse_args(args(&["inspect", "a", "b"])).is_err());
        assert!(parse_args(args(&["fly"])).is_err());
        assert!(parse_args(args(&["--config"])).is_err());
    }
}
