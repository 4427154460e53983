use std::env;
use std::path::{Path, PathBuf};
use std::process;

use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use civic_cycle::core::world::CycleEngine;
use civic_cycle::data::config::{load_kernel_config, KernelConfig, DEFAULT_CONFIG_PATH};
use civic_cycle::data::fixture::load_ledger_fixture;
use civic_cycle::world::SqliteTables;
use civic_cycle::ReplayVerdict;

const USAGE: &str = "usage: civic-cycle [--config <path>] [--db <path>] [--seed <n>] <command>

commands:
  seed <fixture.json>             load a JSON ledger fixture
  run <cycle>                     run one cycle and persist it
  dry-run <cycle>                 run one cycle, print the write intents only
  replay <cycle>                  re-run a recorded cycle and compare fingerprints
                                  (exit 2 diverged, exit 3 ledger changed since)
  resolve <initiative-id> <cycle> resolve one initiative now
  ripples <cycle> [neighborhood]  combined effect of the active ripples";

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    seed: Option<u32>,
    command: Vec<String>,
}

#[derive(Debug)]
enum Command {
    Seed(PathBuf),
    Run(u32),
    DryRun(u32),
    Replay(u32),
    Resolve { id: String, cycle: u32 },
    Ripples { cycle: u32, neighborhood: Option<String> },
}

fn main() {
    let args = parse_args(env::args().skip(1).collect());
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = match load_kernel_config(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config: {}", err);
            process::exit(1);
        }
    };
    apply_overrides(&mut config, &args);
    init_tracing(&config);

    let command = match parse_command(&args.command) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}\n\n{}", message, USAGE);
            process::exit(1);
        }
    };

    let tables = match SqliteTables::open(&config.ledger_path) {
        Ok(tables) => tables,
        Err(err) => {
            eprintln!(
                "Failed to open ledger at {}: {}",
                config.ledger_path.display(),
                err
            );
            process::exit(1);
        }
    };

    if let Command::Seed(path) = &command {
        seed_ledger(tables, path);
        return;
    }

    let mut engine = match CycleEngine::new(tables, config.base_seed) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("Failed to prepare ledger: {}", err);
            process::exit(1);
        }
    };

    match command {
        Command::Seed(_) => {}
        Command::Run(cycle) => match engine.run_cycle(cycle) {
            Ok(report) => print_json(&report),
            Err(err) => fail(err),
        },
        Command::DryRun(cycle) => match engine.dry_run(cycle) {
            Ok(report) => print_json(&report.intents),
            Err(err) => fail(err),
        },
        Command::Replay(cycle) => match engine.replay(cycle) {
            Ok(report) => {
                print_json(&report);
                match report.verdict {
                    ReplayVerdict::Matched => {}
                    ReplayVerdict::Diverged => process::exit(2),
                    ReplayVerdict::InputsChanged => process::exit(3),
                }
            }
            Err(err) => fail(err),
        },
        Command::Resolve { id, cycle } => match engine.resolve_initiative_now(&id, cycle) {
            Ok(result) => print_json(&result),
            Err(err) => fail(err),
        },
        Command::Ripples {
            cycle,
            neighborhood,
        } => match engine.ripple_effects(neighborhood.as_deref(), cycle) {
            Ok(effects) => print_json(&effects),
            Err(err) => fail(err),
        },
    }
}

fn init_tracing(config: &KernelConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn apply_overrides(config: &mut KernelConfig, args: &CliArgs) {
    if let Some(db) = &args.db {
        config.ledger_path = db.clone();
    }
    if args.seed.is_some() {
        config.base_seed = args.seed;
    }
}

fn seed_ledger(mut tables: SqliteTables, path: &Path) {
    let fixture = match load_ledger_fixture(path) {
        Ok(fixture) => fixture,
        Err(err) => {
            eprintln!("Failed to load fixture: {}", err);
            process::exit(1);
        }
    };
    match fixture.install(&mut tables) {
        Ok(count) => println!("Seeded {} stores from {}", count, path.display()),
        Err(err) => {
            eprintln!("Failed to seed ledger: {}", err);
            process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(err) => {
            eprintln!("Failed to encode output: {}", err);
            process::exit(1);
        }
    }
}

fn fail(err: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", err);
    process::exit(1);
}

fn parse_args(args: Vec<String>) -> CliArgs {
    let mut parsed = CliArgs::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(value) = iter.next() {
                    parsed.config = Some(PathBuf::from(value));
                }
            }
            "--db" => {
                if let Some(value) = iter.next() {
                    parsed.db = Some(PathBuf::from(value));
                }
            }
            "--seed" => {
                if let Some(value) = iter.next() {
                    match value.parse::<u32>() {
                        Ok(seed) => parsed.seed = Some(seed),
                        Err(_) => eprintln!("Ignoring invalid --seed value {:?}", value),
                    }
                }
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                process::exit(0);
            }
            _ => parsed.command.push(arg),
        }
    }
    parsed
}

fn parse_command(words: &[String]) -> Result<Command, String> {
    let (name, rest) = match words.split_first() {
        Some((name, rest)) => (name.as_str(), rest),
        None => return Err("missing command".to_string()),
    };
    match (name, rest) {
        ("seed", [path]) => Ok(Command::Seed(PathBuf::from(path))),
        ("run", [cycle]) => Ok(Command::Run(parse_cycle(cycle)?)),
        ("dry-run", [cycle]) => Ok(Command::DryRun(parse_cycle(cycle)?)),
        ("replay", [cycle]) => Ok(Command::Replay(parse_cycle(cycle)?)),
        ("resolve", [id, cycle]) => Ok(Command::Resolve {
            id: id.clone(),
            cycle: parse_cycle(cycle)?,
        }),
        ("ripples", [cycle]) => Ok(Command::Ripples {
            cycle: parse_cycle(cycle)?,
            neighborhood: None,
        }),
        ("ripples", [cycle, neighborhood]) => Ok(Command::Ripples {
            cycle: parse_cycle(cycle)?,
            neighborhood: Some(neighborhood.clone()),
        }),
        _ => Err(format!("unknown or incomplete command: {}", words.join(" "))),
    }
}

fn parse_cycle(raw: &str) -> Result<u32, String> {
    raw.parse::<u32>()
        .map_err(|_| format!("cycle must be a non-negative integer, got {:?}", raw))
}
