use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;

use conduit::{
    ExecutionPlanSubsetInfo, PlanExecutor, config::Config, create_execution_plan, create_subplan,
    observability::{self, ObservabilityOptions},
    pipeline_examples::{get_example, list_examples},
};

#[derive(Debug, Parser)]
#[command(name = "conduit")]
#[command(about = "Compile and run the bundled example pipelines.")]
struct Args {
    /// JSON run environment; overrides CONDUIT_ENVIRONMENT.
    #[arg(long, global = true)]
    environment: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List bundled example pipelines.
    Examples,
    /// Print the compiled execution plan as JSON.
    Plan {
        name: String,
        /// Keep only these step keys.
        #[arg(long = "step")]
        steps: Vec<String>,
    },
    /// Compile and execute a pipeline, printing the run result as JSON.
    Run { name: String },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(path) = args.environment {
        config.environment_path = Some(path);
    }
    observability::init(ObservabilityOptions::new(config.log_filter.clone()));

    match args.command {
        Command::Examples => {
            for name in list_examples() {
                let example = get_example(name).map_err(|err| anyhow!(err))?;
                println!("{name:<16} {}", example.description);
            }
        }
        Command::Plan { name, steps } => {
            let example = get_example(&name).map_err(|err| anyhow!(err))?;
            let environment = config.load_environment(example.environment)?;
            let plan = create_execution_plan(&example.pipeline, &environment)
                .with_context(|| format!("compile pipeline {name}"))?;
            let plan = if steps.is_empty() {
                plan
            } else {
                create_subplan(&plan, &ExecutionPlanSubsetInfo::new(steps))
                    .context("derive subplan")?
            };
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Run { name } => {
            let example = get_example(&name).map_err(|err| anyhow!(err))?;
            let environment = config.load_environment(example.environment)?;
            let plan = create_execution_plan(&example.pipeline, &environment)
                .with_context(|| format!("compile pipeline {name}"))?;
            info!(pipeline = %name, steps = plan.len(), "compiled plan");
            let result = PlanExecutor::new(&example.pipeline)
                .with_run_context(environment.context.clone())
                .execute(&plan, None)
                .with_context(|| format!("run pipeline {name}"))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
