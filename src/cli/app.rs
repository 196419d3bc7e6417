// ABOUTME: Main application orchestration for the stela CLI
// ABOUTME: Loads units, builds the graph, and runs the chosen platform

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use super::{Args, Commands};
use crate::dag::{BuildReport, GraphBuilder, WorkflowGraph};
use crate::engine::LocalDispatcher;
use crate::lang::WorkflowUnit;

pub struct App;

impl App {
    pub fn new() -> Self {
        Self
    }

    fn init_logging(&self, verbose: bool) {
        let default = if verbose { "debug" } else { "info" };
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    pub async fn run(&self, args: Args) -> Result<()> {
        self.init_logging(args.verbose);

        match args.command {
            Commands::Run {
                units,
                directory,
                clean,
                run_id,
                log_file,
                jobs,
            } => {
                let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                let mut graph = self.compile(&units, &run_id)?;

                let mut dispatcher = LocalDispatcher::new(&directory)
                    .with_max_concurrent(jobs)
                    .with_clean(clean);
                if let Some(log_file) = log_file {
                    dispatcher = dispatcher.with_log_file(log_file);
                }

                dispatcher.run(&mut graph).await?;
                self.print_terminals(&graph);
                Ok(())
            }

            Commands::Dot { units, output } => {
                let graph = self.compile(&units, "dot")?;
                let dot = graph.to_dot();
                match output {
                    Some(path) => std::fs::write(&path, dot)
                        .with_context(|| format!("writing dot output to {}", path.display()))?,
                    None => print!("{dot}"),
                }
                Ok(())
            }

            Commands::Validate { units } => {
                let run_id = Uuid::new_v4().to_string();
                self.compile(&units, &run_id)?;
                info!("workflow units are valid");
                Ok(())
            }
        }
    }

    /// Loads and compiles every unit into one graph; diagnostics are printed
    /// and errors refuse execution.
    fn compile(&self, unit_paths: &[PathBuf], run_id: &str) -> Result<WorkflowGraph> {
        let mut builder = GraphBuilder::with_run_id(run_id);

        for path in unit_paths {
            let unit = WorkflowUnit::from_file(path)?;
            info!(unit = %path.display(), workflow = %unit.workflow, "compiling workflow unit");
            builder.add_unit(&unit)?;
        }

        let (graph, report) = builder.finish();
        self.print_diagnostics(unit_paths, &report)?;
        Ok(graph)
    }

    fn print_diagnostics(&self, unit_paths: &[PathBuf], report: &BuildReport) -> Result<()> {
        for error in report.errors() {
            eprintln!("{error}");
        }
        for warning in report.warnings() {
            warn!("{warning}");
        }

        if report.has_errors() {
            let names: Vec<String> = unit_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            bail!(
                "{} error(s) compiling {}; nothing was executed",
                report.errors().count(),
                names.join(", ")
            );
        }
        Ok(())
    }

    /// Prints each terminal variable with its resolved values.
    fn print_terminals(&self, graph: &WorkflowGraph) {
        for (name, values) in graph.terminal_values() {
            match values {
                Ok(values) => {
                    let rendered: Vec<String> =
                        values.iter().map(|v| format!("'{v}'")).collect();
                    println!("{name} = [ {} ]", rendered.join(", "));
                }
                Err(_) => println!("{name} = <not derivable>"),
            }
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
