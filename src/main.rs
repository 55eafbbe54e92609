mod cli;

use cli::{CliConfig, CliError};
use indicatif::ProgressBar;
use std::path::Path;
use std::sync::Arc;
use thumbforge_core::{progress, reporting, scheduler, RunConfig};

const REPORT_PATH: &str = "thumbnail_report.json";

fn main() {
    let config = CliConfig::from_env().unwrap_or_else(|err| match err {
        CliError::Help => {
            println!("{}", err);
            std::process::exit(0);
        }
        _ => {
            eprintln!("{}", err);
            std::process::exit(2);
        }
    });

    let mut run_config = RunConfig::new()
        .with_jobs(config.jobs)
        .with_force(config.force);
    if let Some(output) = config.output {
        run_config = run_config.with_cache_root(output);
    }

    let progress_bar = Arc::new(ProgressBar::new(0));
    progress_bar.set_style(progress::default_style());

    let summary = match scheduler::run(&config.input, &run_config, &progress_bar) {
        Ok(summary) => summary,
        Err(error) => {
            progress_bar.abandon();
            eprintln!("{}", error);
            std::process::exit(2);
        }
    };
    progress_bar.finish_with_message("done");

    if summary.total() == 0 {
        println!("No supported image files found.");
        return;
    }

    reporting::print_summary(&summary);

    if summary.has_failures() {
        match reporting::write_report(&summary, Path::new(REPORT_PATH)) {
            Ok(_) => eprintln!("Failure report written to {}", REPORT_PATH),
            Err(error) => eprintln!("Error writing failure report: {}", error),
        }
        std::process::exit(1);
    }
}
