// SPDX-License-Identifier: GPL-3.0-or-later

use codebasin::analysis::{Analysis, PlatformInstance};
use codebasin::codebase::CodeBase;
use codebasin::compdb::CompilationDatabase;
use codebasin::compilers::CompilerRegistry;
use codebasin::{args, diagnostics, report};
use std::env;
use std::fs;
use std::process::ExitCode;

/// Driver function of the coverage tool.
fn main() -> anyhow::Result<ExitCode> {
    let matches = args::cli_cov().get_matches();
    let arguments = args::CovArguments::try_from(matches)?;

    diagnostics::init(log::LevelFilter::Warn);

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

fn run(arguments: &args::CovArguments) -> anyhow::Result<()> {
    let source_dir = match &arguments.source_dir {
        Some(path) => path.clone(),
        None => env::current_dir()?,
    };

    // Run the analysis as if the database described a single platform.
    let codebase = CodeBase::new(&source_dir, &arguments.excludes);
    let registry = CompilerRegistry::with_user_config(codebase.root())?;
    let database = CompilationDatabase::from_file(&arguments.compdb)?;
    let units = codebasin::analysis::units_from_database(&registry, &database);

    let analysis = Analysis {
        codebase,
        platforms: vec![PlatformInstance {
            name: "cli".to_string(),
            units,
        }],
    };
    let setmap = analysis.run();

    let coverage = report::coverage(&setmap, &analysis.codebase);
    fs::write(&arguments.output, serde_json::to_string_pretty(&coverage)?)?;
    log::info!("coverage written to {}", arguments.output.display());

    Ok(())
}
