use clap::{arg, command};
use url::Url;
use websteps_core::thelper::DEFAULT_TH_URL;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("websteps")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("websteps")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Enable debug logging (RUST_LOG overrides)")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            command!("measure")
                .about(
                    "Measure a URL, or a list of URLs, following redirects across every \
                DNS, TCP, TLS and QUIC path. Appends one JSON line per input to the report.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The URL to measure")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("input-file"),
                )
                .arg(
                    arg!(-i --"input-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs to measure")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("JSONL report to append to")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .default_value("report.jsonl"),
                )
                .arg(
                    arg!(--"max-redirects" <NUM>)
                        .required(false)
                        .help("Maximum number of URLs measured per input, redirects included")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"only-scheme")
                        .required(false)
                        .help("Only probe the scheme of the input URL (default: both HTTP and HTTPS)")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-probe timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(-b --"backend" <URL>)
                        .required(false)
                        .help("Test helper to submit every measured URL to (default: none)")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-C --"cache-dir" <PATH>)
                        .required(false)
                        .help("Directory where to cache probe results (default: no cache)"),
                )
                .arg(
                    arg!(--"mostly-cache")
                        .required(false)
                        .help("Never expire cache entries and keep adding to the cache")
                        .action(clap::ArgAction::SetTrue)
                        .requires("cache-dir"),
                ),
        )
        .subcommand(
            command!("thd")
                .about("Run the test helper daemon")
                .arg(
                    arg!(-A --"address" <ADDRESS>)
                        .required(false)
                        .help("Address where to listen")
                        .default_value("0.0.0.0:9876"),
                )
                .arg(
                    arg!(-C --"cache-dir" <PATH>)
                        .required(false)
                        .help("Directory where to cache probe results (default: no cache)"),
                )
                .arg(
                    arg!(--"mostly-cache")
                        .required(false)
                        .help("Never expire cache entries and keep adding to the cache")
                        .action(clap::ArgAction::SetTrue)
                        .requires("cache-dir"),
                ),
        )
        .subcommand(
            command!("thctl")
                .about("Submit one URL to a test helper and print the JSON response")
                .arg(
                    arg!(-i --"input" <URL>)
                        .required(true)
                        .help("URL to submit to the test helper"),
                )
                .arg(
                    arg!(-U --"url" <URL>)
                        .required(false)
                        .help("Test helper server URL")
                        .default_value(DEFAULT_TH_URL),
                )
                .arg(
                    arg!(--"both")
                        .required(false)
                        .help("Ask the test helper to test both HTTP and HTTPS")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"tcp-endpoint" <ENDPOINT>)
                        .required(false)
                        .help("Ask the test helper to test this TCP endpoint (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"quic-endpoint" <ENDPOINT>)
                        .required(false)
                        .help("Ask the test helper to test this QUIC endpoint (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"archival")
                        .required(false)
                        .help("Convert the response to the archival data format")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}
