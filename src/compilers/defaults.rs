// SPDX-License-Identifier: GPL-3.0-or-later

//! Shipped compiler specifications.
//!
//! These cover the compiler families the tool understands out of the
//! box. User configuration from `.cbi/config` is additive on top.

use super::{CompilerSpec, ModeSpec, PassSpec};
use super::rules::{Action, ParserRule};
use std::collections::BTreeMap;

fn rule(flags: &[&str], action: Action, dest: &str, const_value: Option<&str>) -> ParserRule {
    ParserRule {
        flags: flags.iter().map(|f| f.to_string()).collect(),
        action,
        dest: dest.to_string(),
        const_value: const_value.map(str::to_string),
        sep: None,
        format: None,
        r#override: false,
    }
}

fn mode(name: &str, defines: &[&str]) -> ModeSpec {
    ModeSpec {
        name: name.to_string(),
        defines: defines.iter().map(|d| d.to_string()).collect(),
        include_paths: Vec::new(),
        include_files: Vec::new(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The built-in compiler table, keyed by executable basename.
pub fn builtin_specs() -> BTreeMap<String, CompilerSpec> {
    let mut specs = BTreeMap::new();

    // GNU family.
    specs.insert(
        "gnu".to_string(),
        CompilerSpec {
            alias_of: None,
            options: Vec::new(),
            parser: vec![rule(
                &["-fopenmp"],
                Action::AppendConst,
                "modes",
                Some("openmp"),
            )],
            modes: vec![mode("openmp", &["_OPENMP"])],
            passes: Vec::new(),
            fortran_form: None,
        },
    );
    for name in ["gcc", "g++", "cc", "c++", "gfortran"] {
        specs.insert(name.to_string(), CompilerSpec::alias("gnu"));
    }

    // Clang family. `-fsycl-is-device` marks a SYCL device compilation.
    specs.insert(
        "clang".to_string(),
        CompilerSpec {
            alias_of: None,
            options: Vec::new(),
            parser: vec![
                rule(&["-fopenmp"], Action::AppendConst, "modes", Some("openmp")),
                rule(
                    &["-fsycl-is-device"],
                    Action::AppendConst,
                    "modes",
                    Some("sycl-device"),
                ),
            ],
            modes: vec![
                mode("openmp", &["_OPENMP"]),
                mode("sycl-device", &["__SYCL_DEVICE_ONLY__"]),
            ],
            passes: Vec::new(),
            fortran_form: None,
        },
    );
    specs.insert("clang++".to_string(), CompilerSpec::alias("clang"));

    // Intel oneAPI family: SYCL offload implies a spir64 device pass.
    specs.insert(
        "intel".to_string(),
        CompilerSpec {
            alias_of: None,
            options: Vec::new(),
            parser: vec![
                rule(&["-fopenmp", "-qopenmp"], Action::AppendConst, "modes", Some("openmp")),
                rule(&["-fsycl"], Action::AppendConst, "modes", Some("sycl")),
                ParserRule {
                    flags: vec!["-fsycl-targets".to_string()],
                    action: Action::StoreSplit,
                    dest: "modes".to_string(),
                    const_value: None,
                    sep: Some(",".to_string()),
                    format: Some("sycl-$value".to_string()),
                    r#override: false,
                },
            ],
            modes: vec![mode("openmp", &["_OPENMP"]), mode("sycl", &[])],
            passes: vec![PassSpec {
                name: "sycl-spir64".to_string(),
                modes: strings(&["sycl"]),
                defines: strings(&["__SYCL_DEVICE_ONLY__", "__SPIR__", "__SPIRV__"]),
                include_paths: Vec::new(),
                include_files: Vec::new(),
            }],
            fortran_form: None,
        },
    );
    for name in ["icx", "icpx", "ifx", "icc", "icpc", "ifort"] {
        specs.insert(name.to_string(), CompilerSpec::alias("intel"));
    }

    // NVIDIA CUDA compiler driver: every invocation has a device pass.
    specs.insert(
        "nvcc".to_string(),
        CompilerSpec {
            alias_of: None,
            options: strings(&["--cbi-nvcc-device"]),
            parser: vec![
                rule(
                    &["--cbi-nvcc-device"],
                    Action::AppendConst,
                    "modes",
                    Some("cuda"),
                ),
                rule(
                    &["-fopenmp", "-Xcompiler=-fopenmp"],
                    Action::AppendConst,
                    "modes",
                    Some("openmp"),
                ),
            ],
            modes: vec![
                mode("cuda", &["__NVCC__", "__CUDACC__"]),
                mode("openmp", &["_OPENMP"]),
            ],
            passes: Vec::new(),
            fortran_form: None,
        },
    );

    // Cray compiler driver.
    specs.insert(
        "cray".to_string(),
        CompilerSpec {
            alias_of: None,
            options: Vec::new(),
            parser: vec![rule(
                &["-fopenmp", "-homp"],
                Action::AppendConst,
                "modes",
                Some("openmp"),
            )],
            modes: vec![mode("openmp", &["_OPENMP"])],
            passes: Vec::new(),
            fortran_form: None,
        },
    );
    for name in ["ftn", "crayftn", "craycc", "crayCC"] {
        specs.insert(name.to_string(), CompilerSpec::alias("cray"));
    }

    specs
}
