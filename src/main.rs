use clap::Parser;
use std::process::ExitCode;

mod commands;
mod output;

use commands::deploy::{self, DeployArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "apex-deploy")]
#[command(version = VERSION)]
#[command(about = "Build, package and ship a static site to a server over SSH")]
struct Cli {
    #[command(flatten)]
    deploy: DeployArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match deploy::run(cli.deploy) {
        Ok((output, None)) => {
            output::print_success(output);
            ExitCode::SUCCESS
        }
        Ok((output, Some(err))) => {
            output::print_failure(Some(output), &err);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("[deploy] error: {}", err.message);
            output::print_result::<()>(Err(err));
            ExitCode::FAILURE
        }
    }
}
