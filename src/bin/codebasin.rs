// SPDX-License-Identifier: GPL-3.0-or-later

use codebasin::{analysis, args, config, diagnostics, report};
use std::env;
use std::process::ExitCode;

/// Driver function of the application.
fn main() -> anyhow::Result<ExitCode> {
    let matches = args::cli_main().get_matches();
    let arguments = args::MainArguments::try_from(matches)?;

    diagnostics::init(args::log_level(arguments.verbosity));

    let pkg_version = env!("CARGO_PKG_VERSION");
    log::info!("Code Base Investigator v{pkg_version}");

    let result = run(&arguments);
    diagnostics::summarize();

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(error) => {
            log::error!("{error:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run(arguments: &args::MainArguments) -> anyhow::Result<()> {
    // The root of the analysis is where the tool runs, matching the
    // interpretation of relative paths in the reports.
    let root = env::current_dir()?;

    let analysis_config = config::Loader::load(&arguments.analysis_file)?;
    let analysis = analysis::Analysis::configure(
        &root,
        &analysis_config,
        &arguments.platforms,
        &arguments.excludes,
    )?;
    let platforms = analysis.platform_names();

    log::info!("platforms: {}", platforms.join(", "));
    let setmap = analysis.run();

    let enabled = |kind: args::ReportKind| {
        arguments.reports.contains(&args::ReportKind::All) || arguments.reports.contains(&kind)
    };

    if enabled(args::ReportKind::Summary) {
        println!("{}", report::summary(&setmap, &platforms));
    }
    if enabled(args::ReportKind::Files) {
        println!("{}", report::files(&setmap, &platforms, analysis.codebase.root()));
    }
    if enabled(args::ReportKind::Duplicates) {
        println!("{}", report::duplicates(&analysis.codebase));
    }
    if enabled(args::ReportKind::Clustering) {
        if let Some(matrix) = report::clustering(&setmap, &platforms) {
            println!("{matrix}");
        }
    }

    Ok(())
}
