use std::process::ExitCode;

use clap::Parser;

use mockupfe::{cli, log_info, logger};

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let args = cli::CliArgs::parse();
    log_info!("CLI run: base {}, {} mark pattern(s)", args.base.display(), args.mark.len());
    cli::run(args)
}
