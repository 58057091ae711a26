//! CLI parse tests and fixture-upstream tests.

use super::Cli;
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

mod args;
mod control;
mod fixtures;
