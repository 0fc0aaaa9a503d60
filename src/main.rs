use std::process::ExitCode;

use clap::Parser;

use malcolm::{Args, RunOptions, fake_connection, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let options = RunOptions::builder()
        .device_name(args.device())
        .settings(args.device_settings())
        .maybe_output_format(args.output_format())
        .maybe_log_level(args.log_level())
        .build();
    let (command, fake_args) = args.into_command_and_fake_args();

    match run(command, &mut stdout, fake_connection(fake_args), options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
