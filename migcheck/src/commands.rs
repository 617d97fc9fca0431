use crate::CLAP_STYLING;
use clap::{arg, command};
use migcheck_core::config::{
    check_url, parse_concurrency, parse_delay, parse_depth, parse_redirect_policy,
    parse_renderer, parse_timeout,
};
use url::Url;

fn parse_source_url(value: &str) -> Result<Url, migcheck_core::ConfigError> {
    check_url("source", value)
}

fn parse_destination_url(value: &str) -> Result<Url, migcheck_core::ConfigError> {
    check_url("destination", value)
}

fn parse_endpoint_url(value: &str) -> Result<Url, migcheck_core::ConfigError> {
    check_url("render endpoint", value)
}

/// Options shared by everything that fetches pages.
fn with_fetch_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-c --"concurrency" <NUM>)
            .required(false)
            .help("Maximum number of requests in flight")
            .value_parser(parse_concurrency)
            .default_value("5"),
    )
    .arg(
        arg!(--"timeout" <MS>)
            .required(false)
            .help("Per-request timeout in milliseconds (default: 30000 direct, 60000 render-proxy)")
            .value_parser(parse_timeout),
    )
    .arg(
        arg!(--"delay" <MS>)
            .required(false)
            .help("Pause after each request, in milliseconds")
            .value_parser(parse_delay)
            .default_value("0"),
    )
    .arg(
        arg!(--"renderer" <RENDERER>)
            .required(false)
            .help("How pages are fetched: direct or render-proxy")
            .value_parser(parse_renderer)
            .default_value("direct"),
    )
    .arg(
        arg!(--"render-endpoint" <URL>)
            .required(false)
            .help("Render service endpoint, required with --renderer render-proxy")
            .value_parser(parse_endpoint_url),
    )
}

fn with_crawl_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-u --"url" <URL>)
            .required(true)
            .help("The source site to crawl")
            .value_parser(parse_source_url),
    )
    .arg(
        arg!(-d --"depth" <DEPTH>)
            .required(false)
            .help("Maximum link depth from the start page")
            .value_parser(parse_depth)
            .default_value("3"),
    )
    .arg(
        arg!(-e --"exclude" <PATTERN>)
            .required(false)
            .help("Skip URLs matching this regex (case-insensitive, repeatable)")
            .action(clap::ArgAction::Append),
    )
}

fn with_validation_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-D --"destination" <URL>)
            .required(true)
            .help("Base URL of the migrated site")
            .value_parser(parse_destination_url),
    )
    .arg(
        arg!(--"redirects" <POLICY>)
            .required(false)
            .help("How path-changing redirects are graded: warn or allow")
            .value_parser(parse_redirect_policy)
            .default_value("warn"),
    )
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("migcheck")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("migcheck")
        .about("Check that a migrated website still serves every page of the old one")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Only print warnings and errors; no progress or summary")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log every request")
                .required(false)
                .global(true)
                .conflicts_with("quiet"),
        )
        .subcommand_required(true)
        .subcommand(with_fetch_args(with_crawl_args(
            command!("crawl")
                .about("Crawl the source site and record every reachable page")
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Where to write the crawl JSON (default: crawl-{host}-{timestamp}.json)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )))
        .subcommand(with_fetch_args(with_validation_args(
            command!("validate")
                .about("Check the pages of a previous crawl against the destination site")
                .arg(
                    arg!(-i --"input" <CRAWL_JSON>)
                        .required(true)
                        .help("Crawl output to validate")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Where to write the validation JSON (default: validation-{host}-{timestamp}.json)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )))
        .subcommand(with_fetch_args(with_validation_args(with_crawl_args(
            command!("check")
                .about("Crawl the source site, then validate it against the destination")
                .arg(
                    arg!(--"crawl-output" <PATH>)
                        .required(false)
                        .help("Where to write the crawl JSON")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Where to write the validation JSON")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        ))))
}
