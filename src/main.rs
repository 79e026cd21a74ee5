use std::process::ExitCode;

use clap::Parser;
use audioconv::cli::commands::{Cli, Commands};
use audioconv::utils::reporting::Reporter;
use audioconv::{BatchResult, Engine, RunHandle};

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let engine = Engine::new(&cli.log_dir);

    match &cli.command {
        Commands::Convert { input, report, .. } => {
            println!("=== Starting Conversion ===");
            println!("Source folder: {}", input.display());

            let Some(config) = cli.command.run_config() else {
                return ExitCode::FAILURE;
            };
            println!("Target: {}", config.profile);

            let handle = match engine.start_conversion(config) {
                Ok(handle) => handle,
                Err(e) => {
                    eprintln!("Error starting conversion: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            let result = follow(handle);

            println!(
                "\n{} converted, {} skipped, {} failed",
                result.succeeded(),
                result.skipped(),
                result.failed()
            );

            if let Some(report_path) = report {
                match Reporter::new().generate_task_report(&result.tasks, report_path) {
                    Ok(()) => println!("Report saved to: {}", report_path.display()),
                    Err(e) => eprintln!("Error generating report: {}", e),
                }
            }

            finish(&result, "Conversion")
        }

        Commands::Split { cue, audio, output, .. } => {
            println!("=== Starting Cue Split ===");
            println!("Cue sheet: {}", cue.display());
            println!("Audio: {}", audio.display());
            println!("Output folder: {}", output.display());

            let Some(config) = cli.command.split_config() else {
                return ExitCode::FAILURE;
            };

            let handle = match engine.start_split(config) {
                Ok(handle) => handle,
                Err(e) => {
                    eprintln!("Error starting split: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            let result = follow(handle);

            finish(&result, "Cue Split")
        }
    }
}

fn follow(handle: RunHandle) -> BatchResult {
    for percent in handle.progress().iter() {
        println!("Progress: {}%", percent);
    }
    handle.wait()
}

fn finish(result: &BatchResult, name: &str) -> ExitCode {
    if result.is_success() {
        println!("\n=== {} Complete ===", name);
        return ExitCode::SUCCESS;
    }

    eprintln!("\nThe following items failed:");
    for failure in &result.failures {
        eprintln!("  {}", failure);
    }
    println!("\n=== {} Finished With Errors ===", name);
    ExitCode::FAILURE
}
