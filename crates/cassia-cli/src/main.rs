use cassia_solver::{SimplexSolver, SolverError, Strength, SystemSnapshot, Variable};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cassia")]
#[command(about = "Solve linear constraint systems with the Cassowary algorithm", long_about = None)]
struct Cli {
    /// Log solver activity at debug level (overrides CASSIA_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a snapshot and print the variable values
    Solve {
        /// JSON snapshot of the constraint system
        file: PathBuf,
        /// Output format (pretty, json)
        #[arg(short, long, default_value = "pretty")]
        format: String,
        /// Print tableau statistics
        #[arg(long)]
        info: bool,
    },
    /// Check that a snapshot loads and every variable is pinned
    Check {
        /// JSON snapshot of the constraint system
        file: PathBuf,
    },
    /// Run an edit session suggesting new values for some variables
    Suggest {
        /// JSON snapshot of the constraint system
        file: PathBuf,
        /// Suggestion as name=value, repeatable
        #[arg(short, long = "set", value_parser = parse_assignment, required = true)]
        set: Vec<(String, f64)>,
        /// Strength of the edit constraints
        #[arg(long, default_value = "strong")]
        strength: String,
    },
}

fn parse_assignment(arg: &str) -> Result<(String, f64), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", arg))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value for '{}': {}", name, e))?;
    Ok((name.trim().to_string(), value))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("CASSIA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init();
}

fn read_snapshot(file: &Path) -> SystemSnapshot {
    let source = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file: {}", e);
            std::process::exit(1);
        }
    };
    match serde_json::from_str(&source) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("Invalid snapshot: {}", e);
            std::process::exit(1);
        }
    }
}

fn load(file: &Path) -> (SimplexSolver, BTreeMap<String, Variable>) {
    let snapshot = read_snapshot(file);
    match SimplexSolver::from_snapshot(&snapshot) {
        Ok(loaded) => {
            debug!(
                component = "cli",
                operation = "load",
                file = %file.display(),
                variables = loaded.1.len(),
                constraints = snapshot.constraints.len(),
                "Loaded snapshot"
            );
            loaded
        }
        Err(e) => {
            eprintln!("Load error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_values(solver: &SimplexSolver) {
    println!("Values:");
    for (_, name, value) in solver.variables() {
        println!("  {:20} {:12.4}", name, value);
    }
}

/// Counts printed by `check`, only once every variable is pinned.
fn check_summary(solver: &SimplexSolver, variables: usize) -> Result<String, SolverError> {
    solver.ensure_stays()?;
    let constraints = solver.constraints().count();
    let required = solver
        .constraints()
        .filter(|(_, c)| c.is_required())
        .count();
    Ok(format!(
        "  {} variables\n  {} constraints ({} required)\n",
        variables, constraints, required
    ))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Solve { file, format, info } => {
            let (mut solver, _) = load(&file);
            if let Err(e) = solver.solve() {
                eprintln!("Solve error [{}]: {}", e.code(), e);
                std::process::exit(1);
            }

            if format == "json" {
                match serde_json::to_string_pretty(&solver.snapshot()) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error writing snapshot: {}", e);
                        std::process::exit(1);
                    }
                }
            } else {
                print_values(&solver);
            }

            if info {
                println!();
                print!("{}", solver.internal_info());
            }
        }
        Commands::Check { file } => {
            let (solver, vars) = load(&file);
            match check_summary(&solver, vars.len()) {
                Ok(summary) => {
                    println!("✓ {} is valid", file.display());
                    print!("{}", summary);
                }
                Err(e) => {
                    eprintln!("✗ {}: {}", file.display(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Suggest {
            file,
            set,
            strength,
        } => {
            let Some(strength) = Strength::from_name(&strength) else {
                eprintln!("Unknown strength: {}", strength);
                std::process::exit(1);
            };
            let (mut solver, vars) = load(&file);

            let mut suggestions = Vec::new();
            for (name, value) in set {
                let Some(&var) = vars.get(&name) else {
                    eprintln!("Unknown variable: {}", name);
                    std::process::exit(1);
                };
                if let Err(e) = solver.add_edit_var(var, strength.clone(), 1.0) {
                    eprintln!("Edit error: {}", e);
                    std::process::exit(1);
                }
                suggestions.push((var, value));
            }

            let result = solver.begin_edit().and_then(|_| {
                for &(var, value) in &suggestions {
                    solver.suggest_value(var, value)?;
                }
                solver.resolve()
            });
            if let Err(e) = result {
                eprintln!("Edit error [{}]: {}", e.code(), e);
                std::process::exit(1);
            }

            print_values(&solver);

            if let Err(e) = solver.end_edit() {
                eprintln!("Edit error [{}]: {}", e.code(), e);
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cassia_solver::{Constraint, Relation};

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("width=50"), Ok(("width".to_string(), 50.0)));
        assert_eq!(parse_assignment(" x = -2.5"), Ok(("x".to_string(), -2.5)));
        assert!(parse_assignment("width").is_err());
        assert!(parse_assignment("width=abc").is_err());
    }

    #[test]
    fn test_check_summary_requires_stays() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver
            .add_constraint(Constraint::inequality(x, Relation::Le, y))
            .unwrap();
        assert_eq!(
            check_summary(&solver, 2),
            Err(SolverError::NotEnoughStays)
        );

        solver.add_stay(x, Strength::WEAK, 1.0).unwrap();
        solver.add_stay(y, Strength::WEAK, 1.0).unwrap();
        assert_eq!(
            check_summary(&solver, 2),
            Ok("  2 variables\n  3 constraints (1 required)\n".to_string())
        );
    }

    #[test]
    fn test_cli_parses_suggest() {
        let cli = Cli::parse_from([
            "cassia", "suggest", "layout.json", "--set", "width=50", "-s", "left=10",
        ]);
        match cli.command {
            Commands::Suggest { set, strength, .. } => {
                assert_eq!(set.len(), 2);
                assert_eq!(strength, "strong");
            }
            _ => panic!("expected suggest command"),
        }
    }
}
