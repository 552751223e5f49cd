use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::error::ErrorKind as ClapErrorKind;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::api::{optimize_payload, simulate_payload, simulate_payload_with_progress};
use crate::config::{Settings, CONFIG_PATH_ENV};
use crate::data::catalog::CourseCatalog;
use crate::data::course::Course;
use crate::data::registry::DataRegistry;
use crate::data::z_table::ZScoreTable;
use crate::error::DataError;
use crate::logging;
use crate::optimizer::monte_carlo::MonteCarloAggregator;
use crate::optimizer::request::RequestLimits;
use crate::optimizer::schedule::ScheduleOptimizer;
use crate::parallel::WorkerPool;

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "coursecast",
    version,
    about = "Pick course schedules under a bidding budget and forecast how likely each one is"
)]
pub struct Cli {
    /// YAML settings file (defaults to $COURSECAST_CONFIG).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Course catalog (CSV, XLSX or JSON).
    #[arg(long, global = true)]
    pub courses: Option<PathBuf>,
    /// Z-score table (CSV or XLSX).
    #[arg(long = "z-table", global = true)]
    pub z_table: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Solve one request and print the selection as JSON.
    Optimize {
        /// Request JSON file, or `-` for stdin.
        request: String,
    },
    /// Run a Monte Carlo simulation and print probabilities as JSON.
    Simulate {
        /// Request JSON file, or `-` for stdin.
        request: String,
        /// Worker threads; overrides the configured value.
        #[arg(long)]
        workers: Option<usize>,
        /// Log progress after each batch of runs.
        #[arg(long)]
        progress: bool,
    },
    /// Print prices for a seed as CSV.
    Price {
        seed: u64,
        /// Course ids; all courses when omitted.
        ids: Vec<u32>,
    },
    /// Print the time-slot tokens of each course.
    Tokens {
        /// Course ids; all courses when omitted.
        ids: Vec<u32>,
    },
    /// Check the configured catalog and z-score table.
    Validate,
}

pub fn parse_command(args: &[String]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(args)
}

pub fn run_with_args(args: &[String]) -> i32 {
    let cli = match parse_command(args) {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => EXIT_OK,
                _ => EXIT_USAGE,
            };
            let _ = err.print();
            return code;
        }
    };

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("{message}");
            return EXIT_USAGE;
        }
    };
    logging::init(&settings.log_filter);

    match cli.command {
        Command::Validate => handle_validate(&settings),
        ref command => match DataRegistry::load(&settings) {
            Ok(registry) => dispatch(command, &registry, &settings),
            Err(err) => {
                error!(error = %err, "failed to load data");
                eprintln!("error: {err}");
                EXIT_FAILURE
            }
        },
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, String> {
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let mut settings = Settings::load_from(config_path.as_deref()).map_err(|err| err.to_string())?;
    if let Some(path) = &cli.courses {
        settings.courses_path = path.clone();
    }
    if let Some(path) = &cli.z_table {
        settings.z_table_path = path.clone();
    }
    if let Command::Simulate {
        workers: Some(workers),
        ..
    } = cli.command
    {
        settings.workers = workers;
    }
    Ok(settings)
}

fn dispatch(command: &Command, registry: &DataRegistry, settings: &Settings) -> i32 {
    let optimizer = ScheduleOptimizer::new(registry).with_timeout(settings.solve_timeout());
    match command {
        Command::Optimize { request } => handle_optimize(&optimizer, request),
        Command::Simulate {
            request, progress, ..
        } => {
            let aggregator = MonteCarloAggregator::new(optimizer)
                .with_pool(WorkerPool::with_workers(settings.workers))
                .with_limits(RequestLimits {
                    max_runs: settings.max_runs,
                });
            handle_simulate(&aggregator, request, *progress)
        }
        Command::Price { seed, ids } => handle_price(registry, *seed, ids),
        Command::Tokens { ids } => handle_tokens(registry, ids),
        Command::Validate => handle_validate(settings),
    }
}

fn handle_optimize(optimizer: &ScheduleOptimizer, source: &str) -> i32 {
    let body = match read_request(source) {
        Ok(body) => body,
        Err(message) => {
            eprintln!("{message}");
            return EXIT_FAILURE;
        }
    };
    match optimize_payload(optimizer, &body) {
        Ok(json) => {
            println!("{json}");
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{err}");
            println!("{}", err.to_json());
            EXIT_FAILURE
        }
    }
}

fn handle_simulate(aggregator: &MonteCarloAggregator, source: &str, progress: bool) -> i32 {
    let body = match read_request(source) {
        Ok(body) => body,
        Err(message) => {
            eprintln!("{message}");
            return EXIT_FAILURE;
        }
    };
    let result = if progress {
        simulate_payload_with_progress(aggregator, &body, |done, total| {
            info!(done, total, "simulation progress");
        })
    } else {
        simulate_payload(aggregator, &body)
    };
    match result {
        Ok(json) => {
            println!("{json}");
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{err}");
            println!("{}", err.to_json());
            EXIT_FAILURE
        }
    }
}

fn handle_price(registry: &DataRegistry, seed: u64, ids: &[u32]) -> i32 {
    let courses = match selected_courses(registry.catalog(), ids) {
        Ok(courses) => courses,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_FAILURE;
        }
    };

    let mut out = csv::Writer::from_writer(io::stdout());
    let mut status = EXIT_OK;
    if out.write_record(["id", "section_id", "price"]).is_err() {
        return EXIT_FAILURE;
    }
    for course in courses {
        match registry.price_model().price(course, seed) {
            Ok(price) => {
                let row = [course.id.to_string(), course.section_id.clone(), format!("{price:.2}")];
                if out.write_record(&row).is_err() {
                    return EXIT_FAILURE;
                }
            }
            Err(err) => {
                eprintln!("course {}: {err}", course.id);
                status = EXIT_FAILURE;
            }
        }
    }
    if out.flush().is_err() {
        return EXIT_FAILURE;
    }
    status
}

fn handle_tokens(registry: &DataRegistry, ids: &[u32]) -> i32 {
    let courses = match selected_courses(registry.catalog(), ids) {
        Ok(courses) => courses,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_FAILURE;
        }
    };
    for course in courses {
        let tokens: Vec<String> = registry
            .tokens()
            .tokens_for(course)
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("{}\t{}\t{}", course.id, course.section_id, tokens.join(" "));
    }
    EXIT_OK
}

fn handle_validate(settings: &Settings) -> i32 {
    let loaded = CourseCatalog::load_with(&settings.courses_path, &settings.course_id_mapping);
    let catalog = match loaded {
        Ok(catalog) => catalog,
        Err(DataError::InvalidCatalog(issues)) => {
            println!("catalog {} has {} issue(s):", settings.courses_path.display(), issues.len());
            for issue in issues {
                println!("  {issue}");
            }
            return EXIT_FAILURE;
        }
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_FAILURE;
        }
    };
    let table = match ZScoreTable::load(&settings.z_table_path) {
        Ok(table) => table,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_FAILURE;
        }
    };

    let unpriceable: Vec<u32> = catalog
        .courses()
        .iter()
        .filter(|course| {
            let index = i64::from(course.id) - settings.start_of_index;
            index < 0 || index >= table.rows() as i64
        })
        .map(|course| course.id)
        .collect();
    if !unpriceable.is_empty() {
        println!(
            "{} course(s) fall outside the {}-row z-score table: {:?}",
            unpriceable.len(),
            table.rows(),
            unpriceable
        );
        return EXIT_FAILURE;
    }

    println!(
        "ok: {} courses, {} seeds x {} rows",
        catalog.len(),
        table.seeds().len(),
        table.rows()
    );
    EXIT_OK
}

fn selected_courses<'a>(
    catalog: &'a CourseCatalog,
    ids: &[u32],
) -> Result<Vec<&'a Course>, DataError> {
    if ids.is_empty() {
        Ok(catalog.courses().iter().collect())
    } else {
        catalog.lookup(ids)
    }
}

fn read_request(source: &str) -> Result<String, String> {
    if source == "-" {
        let mut body = String::new();
        io::stdin()
            .read_to_string(&mut body)
            .map_err(|err| format!("failed to read request from stdin: {err}"))?;
        Ok(body)
    } else {
        fs::read_to_string(Path::new(source))
            .map_err(|err| format!("failed to read request '{source}': {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_subcommands_and_global_flags() {
        let cli = parse_command(&args(&[
            "coursecast",
            "simulate",
            "req.json",
            "--workers",
            "4",
            "--courses",
            "c.csv",
        ]))
        .unwrap();
        assert_eq!(cli.courses, Some(PathBuf::from("c.csv")));
        assert_eq!(
            cli.command,
            Command::Simulate {
                request: "req.json".to_string(),
                workers: Some(4),
                progress: false,
            }
        );

        let cli = parse_command(&args(&["coursecast", "price", "7", "1", "2"])).unwrap();
        assert_eq!(
            cli.command,
            Command::Price {
                seed: 7,
                ids: vec![1, 2]
            }
        );
    }

    #[test]
    fn usage_errors_exit_with_two() {
        assert_eq!(run_with_args(&args(&["coursecast"])), EXIT_USAGE);
        assert_eq!(run_with_args(&args(&["coursecast", "serve"])), EXIT_USAGE);
        assert_eq!(
            run_with_args(&args(&["coursecast", "price", "not-a-seed"])),
            EXIT_USAGE
        );
    }
}
