// SPDX-License-Identifier: GPL-3.0-or-later

use codebasin::{analysis, args, config, diagnostics, report};
use std::env;
use std::process::ExitCode;

/// Driver function of the tree view tool.
fn main() -> anyhow::Result<ExitCode> {
    let matches = args::cli_tree().get_matches();
    let arguments = args::TreeArguments::try_from(matches)?;

    diagnostics::init(args::log_level(arguments.verbosity));

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

fn run(arguments: &args::TreeArguments) -> anyhow::Result<()> {
    let root = env::current_dir()?;

    let analysis_config = config::Loader::load(&arguments.analysis_file)?;
    let analysis = analysis::Analysis::configure(
        &root,
        &analysis_config,
        &arguments.platforms,
        &arguments.excludes,
    )?;

    let setmap = analysis.run();
    println!(
        "{}",
        report::tree_view(
            &setmap,
            analysis.codebase.root(),
            arguments.prune,
            arguments.levels
        )
    );

    Ok(())
}
