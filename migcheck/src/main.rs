use colored::Colorize;
use migcheck::{
    command_argument_builder, exit_code, handle_check, handle_crawl, handle_validate,
    init_logging,
};

#[tokio::main]
async fn main() {
    let chosen_command = command_argument_builder().get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let verbose = chosen_command.get_flag("verbose");

    init_logging(verbose, quiet);

    let result = match chosen_command.subcommand() {
        Some(("crawl", primary_command)) => handle_crawl(primary_command, quiet).await.map(|_| ()),
        Some(("validate", primary_command)) => {
            handle_validate(primary_command, quiet).await.map(|_| ())
        }
        Some(("check", primary_command)) => handle_check(primary_command, quiet).await.map(|_| ()),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(exit_code(&e));
    }
}
