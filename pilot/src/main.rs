//! `pilot`: turn a goal into screened shell commands and run them.
//!
//! Plans come from a built-in shortcut or an OpenAI-compatible model, every
//! command is checked against the allow/deny policy, and nothing runs before
//! the user confirms. History lives in `.agent_session.json` in the project.

use clap::Parser;

use pilot::cli::{Cli, run};
use pilot::logging;

fn main() {
    logging::init();
    let cli = Cli::parse();
    std::process::exit(run(&cli));
}
