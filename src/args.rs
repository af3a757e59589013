// SPDX-License-Identifier: GPL-3.0-or-later

//! This module contains the command line interfaces of the tools.
//!
//! The command line parsing is implemented using the `clap` library.
//! Each binary owns a `Command` description here; parsed matches
//! convert into typed argument structs via `TryFrom`.

use anyhow::anyhow;
use clap::{arg, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// The reports the main tool can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    All,
    Summary,
    Clustering,
    Duplicates,
    Files,
}

impl ReportKind {
    fn from_name(name: &str) -> Option<ReportKind> {
        match name {
            "all" => Some(ReportKind::All),
            "summary" => Some(ReportKind::Summary),
            "clustering" => Some(ReportKind::Clustering),
            "duplicates" => Some(ReportKind::Duplicates),
            "files" => Some(ReportKind::Files),
            _ => None,
        }
    }
}

/// Arguments of the `codebasin` binary.
#[derive(Debug, PartialEq)]
pub struct MainArguments {
    pub verbosity: i32,
    pub reports: Vec<ReportKind>,
    pub excludes: Vec<String>,
    pub platforms: Vec<String>,
    pub analysis_file: PathBuf,
}

/// Arguments of the `cbi-tree` binary.
#[derive(Debug, PartialEq)]
pub struct TreeArguments {
    pub verbosity: i32,
    pub excludes: Vec<String>,
    pub platforms: Vec<String>,
    pub prune: bool,
    pub levels: Option<usize>,
    pub analysis_file: PathBuf,
}

/// Arguments of the `cbi-cov` binary.
#[derive(Debug, PartialEq)]
pub struct CovArguments {
    pub source_dir: Option<PathBuf>,
    pub excludes: Vec<String>,
    pub output: PathBuf,
    pub compdb: PathBuf,
}

/// Translate `-v`/`-q` counts into a log level filter.
pub fn log_level(verbosity: i32) -> log::LevelFilter {
    match verbosity {
        i32::MIN..=-1 => log::LevelFilter::Error,
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn verbosity_args() -> [Arg; 2] {
    [
        arg!(-v --verbose ... "Increase verbosity level").action(ArgAction::Count),
        arg!(-q --quiet ... "Decrease verbosity level").action(ArgAction::Count),
    ]
}

fn exclude_arg() -> Arg {
    arg!(-x --exclude <PATTERN> "Exclude files matching this pattern from the code base")
        .action(ArgAction::Append)
}

fn platform_arg() -> Arg {
    arg!(-p --platform <PLATFORM> "Include only the specified platform in the analysis")
        .action(ArgAction::Append)
}

fn analysis_file_arg() -> Arg {
    arg!(<ANALYSIS> "TOML file describing the analysis to be performed")
}

/// The command line interface of `codebasin`.
pub fn cli_main() -> Command {
    Command::new("codebasin")
        .about("Code Base Investigator: analyze multi-platform code bases")
        .version(env!("CARGO_PKG_VERSION"))
        .args(verbosity_args())
        .args(&[
            arg!(-R --report <REPORT> "Generate a report of the specified type")
                .action(ArgAction::Append)
                .value_parser(["all", "summary", "clustering", "duplicates", "files"]),
            exclude_arg(),
            platform_arg(),
            analysis_file_arg(),
        ])
}

/// The command line interface of `cbi-tree`.
pub fn cli_tree() -> Command {
    Command::new("cbi-tree")
        .about("Annotated source-tree view of platform specialization")
        .version(env!("CARGO_PKG_VERSION"))
        .args(verbosity_args())
        .args(&[
            exclude_arg(),
            platform_arg(),
            arg!(--prune "Hide files not reached by any platform").action(ArgAction::SetTrue),
            arg!(-L --levels <N> "Maximum display depth of the directory tree")
                .value_parser(clap::value_parser!(usize)),
            analysis_file_arg(),
        ])
}

/// The command line interface of `cbi-cov`.
pub fn cli_cov() -> Command {
    Command::new("cbi-cov")
        .about("CBI coverage tool")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .subcommand(
            Command::new("compute").about("Compute coverage").args(&[
                arg!(-S --"source-dir" <PATH> "Path to the source directory"),
                exclude_arg(),
                arg!(-o --output <PATH> "Path of the coverage JSON file")
                    .default_value("coverage.json"),
                arg!(<COMPDB> "Path of the compilation database JSON file"),
            ]),
        )
}

fn verbosity_of(matches: &ArgMatches) -> i32 {
    matches.get_count("verbose") as i32 - matches.get_count("quiet") as i32
}

fn strings_of(matches: &ArgMatches, name: &str) -> Vec<String> {
    matches
        .get_many::<String>(name)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

impl TryFrom<ArgMatches> for MainArguments {
    type Error = anyhow::Error;

    fn try_from(matches: ArgMatches) -> Result<Self, Self::Error> {
        let mut reports: Vec<ReportKind> = strings_of(&matches, "report")
            .iter()
            .filter_map(|name| ReportKind::from_name(name))
            .collect();
        if reports.is_empty() {
            reports.push(ReportKind::All);
        }
        let analysis_file = matches
            .get_one::<String>("ANALYSIS")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("missing analysis file"))?;

        Ok(MainArguments {
            verbosity: verbosity_of(&matches),
            reports,
            excludes: strings_of(&matches, "exclude"),
            platforms: strings_of(&matches, "platform"),
            analysis_file,
        })
    }
}

impl TryFrom<ArgMatches> for TreeArguments {
    type Error = anyhow::Error;

    fn try_from(matches: ArgMatches) -> Result<Self, Self::Error> {
        let analysis_file = matches
            .get_one::<String>("ANALYSIS")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("missing analysis file"))?;

        Ok(TreeArguments {
            verbosity: verbosity_of(&matches),
            excludes: strings_of(&matches, "exclude"),
            platforms: strings_of(&matches, "platform"),
            prune: matches.get_flag("prune"),
            levels: matches.get_one::<usize>("levels").copied(),
            analysis_file,
        })
    }
}

impl TryFrom<ArgMatches> for CovArguments {
    type Error = anyhow::Error;

    fn try_from(matches: ArgMatches) -> Result<Self, Self::Error> {
        let Some(("compute", compute)) = matches.subcommand() else {
            return Err(anyhow!("unrecognized subcommand"));
        };
        let compdb = compute
            .get_one::<String>("COMPDB")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("missing compilation database"))?;

        Ok(CovArguments {
            source_dir: compute.get_one::<String>("source-dir").map(PathBuf::from),
            excludes: strings_of(compute, "exclude"),
            output: compute
                .get_one::<String>("output")
                .map(PathBuf::from)
                .expect("output is defaulted"),
            compdb,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_main_defaults() {
        let matches = cli_main().get_matches_from(vec!["codebasin", "analysis.toml"]);
        let arguments = MainArguments::try_from(matches).unwrap();

        assert_eq!(
            arguments,
            MainArguments {
                verbosity: 0,
                reports: vec![ReportKind::All],
                excludes: vec![],
                platforms: vec![],
                analysis_file: PathBuf::from("analysis.toml"),
            }
        );
    }

    #[test]
    fn test_main_full_invocation() {
        let matches = cli_main().get_matches_from(vec![
            "codebasin",
            "-v",
            "-v",
            "-R",
            "summary",
            "-R",
            "clustering",
            "-x",
            "third-party/",
            "-p",
            "cpu",
            "-p",
            "gpu",
            "analysis.toml",
        ]);
        let arguments = MainArguments::try_from(matches).unwrap();

        assert_eq!(arguments.verbosity, 2);
        assert_eq!(
            arguments.reports,
            vec![ReportKind::Summary, ReportKind::Clustering]
        );
        assert_eq!(arguments.excludes, vec!["third-party/"]);
        assert_eq!(arguments.platforms, vec!["cpu", "gpu"]);
    }

    #[test]
    fn test_main_quiet_wins_over_verbose() {
        let matches =
            cli_main().get_matches_from(vec!["codebasin", "-q", "-q", "-v", "analysis.toml"]);
        let arguments = MainArguments::try_from(matches).unwrap();
        assert_eq!(arguments.verbosity, -1);
        assert_eq!(log_level(arguments.verbosity), log::LevelFilter::Error);
    }

    #[test]
    fn test_tree_invocation() {
        let matches = cli_tree().get_matches_from(vec![
            "cbi-tree",
            "--prune",
            "-L",
            "3",
            "-p",
            "gpu",
            "analysis.toml",
        ]);
        let arguments = TreeArguments::try_from(matches).unwrap();

        assert_eq!(
            arguments,
            TreeArguments {
                verbosity: 0,
                excludes: vec![],
                platforms: vec!["gpu".to_string()],
                prune: true,
                levels: Some(3),
                analysis_file: PathBuf::from("analysis.toml"),
            }
        );
    }

    #[test]
    fn test_cov_compute_invocation() {
        let matches = cli_cov().get_matches_from(vec![
            "cbi-cov",
            "compute",
            "-S",
            "/src",
            "-o",
            "cov.json",
            "compile_commands.json",
        ]);
        let arguments = CovArguments::try_from(matches).unwrap();

        assert_eq!(
            arguments,
            CovArguments {
                source_dir: Some(PathBuf::from("/src")),
                excludes: vec![],
                output: PathBuf::from("cov.json"),
                compdb: PathBuf::from("compile_commands.json"),
            }
        );
    }

    #[test]
    fn test_cov_output_default() {
        let matches = cli_cov().get_matches_from(vec!["cbi-cov", "compute", "db.json"]);
        let arguments = CovArguments::try_from(matches).unwrap();
        assert_eq!(arguments.output, PathBuf::from("coverage.json"));
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(log_level(0), log::LevelFilter::Warn);
        assert_eq!(log_level(1), log::LevelFilter::Info);
        assert_eq!(log_level(2), log::LevelFilter::Debug);
        assert_eq!(log_level(3), log::LevelFilter::Trace);
        assert_eq!(log_level(9), log::LevelFilter::Trace);
    }
}
