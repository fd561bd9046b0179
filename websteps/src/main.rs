use tracing_subscriber::EnvFilter;
use websteps::commands::command_argument_builder;
use websteps::handlers::{handle_measure, handle_thctl, handle_thd};

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let verbose = chosen_command.get_flag("verbose");

    // RUST_LOG wins over --verbose
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match chosen_command.subcommand() {
        Some(("measure", primary_command)) => handle_measure(primary_command, quiet).await,
        Some(("thd", primary_command)) => handle_thd(primary_command).await,
        Some(("thctl", primary_command)) => handle_thctl(primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}
