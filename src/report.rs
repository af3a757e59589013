// SPDX-License-Identifier: GPL-3.0-or-later

//! Report rendering over the line attribution map.
//!
//! All reports are plain text written to stdout. The clustering report
//! prints the pairwise distance matrix; dendrogram plotting is left to
//! external tooling.

use crate::codebase::CodeBase;
use crate::tree::SetMap;
use serde_json::json;
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Render a right-aligned ASCII table.
fn table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in rows {
        for (column, cell) in row.iter().enumerate() {
            if column < widths.len() {
                widths[column] = widths[column].max(cell.len());
            }
        }
    }
    let hline = "-".repeat(widths.iter().sum::<usize>() + headers.len());

    let render = |cells: &[String]| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(column, cell)| format!("{:>width$}", cell, width = widths[column]))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut lines = vec![hline.clone(), render(headers), hline.clone()];
    for row in rows {
        lines.push(render(row));
    }
    lines.push(hline);
    lines.join("\n")
}

fn set_name(set: &[String]) -> String {
    format!("{{{}}}", set.join(", "))
}

/// Distance between two platforms: the fraction of lines used by either
/// that are not shared by both.
pub fn distance(counts: &BTreeMap<Vec<String>, u64>, p1: &str, p2: &str) -> f64 {
    let mut total = 0u64;
    let mut different = 0u64;
    for (set, count) in counts {
        let in1 = set.iter().any(|p| p == p1);
        let in2 = set.iter().any(|p| p == p2);
        if in1 || in2 {
            total += count;
        }
        if in1 ^ in2 {
            different += count;
        }
    }
    if total == 0 {
        return 0.0;
    }
    different as f64 / total as f64
}

/// Code divergence as defined by Harrell and Kitson: the average of
/// pairwise distances between platforms.
pub fn divergence(counts: &BTreeMap<Vec<String>, u64>, platforms: &[String]) -> f64 {
    let mut sum = 0.0;
    let mut pairs = 0u64;
    for (i, p1) in platforms.iter().enumerate() {
        for p2 in &platforms[i + 1..] {
            sum += distance(counts, p1, p2);
            pairs += 1;
        }
    }
    if pairs == 0 {
        return 0.0;
    }
    sum / pairs as f64
}

/// The summary report: lines per platform set, code divergence, unused
/// code and the SLOC total.
pub fn summary(setmap: &SetMap, platforms: &[String]) -> String {
    let counts = setmap.set_counts();
    let total: u64 = counts.values().sum();

    let mut keys: Vec<&Vec<String>> = counts.keys().collect();
    keys.sort_by_key(|set| (set.len(), (*set).clone()));

    let mut rows = Vec::new();
    for set in keys {
        let count = counts[set];
        let percent = if total == 0 {
            0.0
        } else {
            count as f64 / total as f64 * 100.0
        };
        rows.push(vec![
            set_name(set),
            count.to_string(),
            format!("{percent:.2}"),
        ]);
    }

    let headers = vec![
        "Platform Set".to_string(),
        "LOC".to_string(),
        "% LOC".to_string(),
    ];
    let unused = counts.get(&Vec::new()).copied().unwrap_or(0);
    let unused_percent = if total == 0 {
        0.0
    } else {
        unused as f64 / total as f64 * 100.0
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", table(&headers, &rows));
    let _ = writeln!(out, "Code Divergence: {:.2}", divergence(&counts, platforms));
    let _ = writeln!(out, "Unused Code (%): {unused_percent:.2}");
    let _ = write!(out, "Total SLOC: {total}");
    out
}

/// The per-file report: SLOC and per-platform coverage percentages.
pub fn files(setmap: &SetMap, platforms: &[String], root: &Path) -> String {
    let mut headers = vec!["File".to_string(), "SLOC".to_string()];
    headers.extend(platforms.iter().map(|p| format!("% {p}")));

    let mut rows = Vec::new();
    for (path, coverage) in setmap.files() {
        let total = coverage.lines.len() as u64;
        let mut row = vec![relative_name(path, root), total.to_string()];
        for platform in platforms {
            let covered = coverage.lines_for(platform);
            let percent = if total == 0 {
                0.0
            } else {
                covered as f64 / total as f64 * 100.0
            };
            row.push(format!("{percent:.1}"));
        }
        rows.push(row);
    }
    table(&headers, &rows)
}

/// The duplicates report: groups of code-base files with identical
/// contents, by SHA-512.
pub fn duplicates(codebase: &CodeBase) -> String {
    let mut by_digest: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in codebase.walk() {
        match std::fs::read(&path) {
            Ok(bytes) => {
                let digest = format!("{:x}", Sha512::digest(&bytes));
                by_digest.entry(digest).or_default().push(path);
            }
            Err(error) => log::warn!("couldn't hash {}: {error}", path.display()),
        }
    }

    let mut out = Vec::new();
    for (digest, paths) in by_digest {
        if paths.len() < 2 {
            continue;
        }
        out.push(format!("Duplicate files ({}):", &digest[..16]));
        for path in paths {
            out.push(format!("  {}", relative_name(&path, codebase.root())));
        }
    }
    if out.is_empty() {
        return "No duplicate files found.".to_string();
    }
    out.join("\n")
}

/// The clustering report: the pairwise distance matrix. Requires at
/// least two platforms.
pub fn clustering(setmap: &SetMap, platforms: &[String]) -> Option<String> {
    if platforms.len() < 2 {
        log::error!("clustering is not supported for a single platform");
        return None;
    }
    let counts = setmap.set_counts();

    let mut headers = vec![String::new()];
    headers.extend(platforms.iter().cloned());
    let rows: Vec<Vec<String>> = platforms
        .iter()
        .map(|p1| {
            let mut row = vec![p1.clone()];
            row.extend(
                platforms
                    .iter()
                    .map(|p2| format!("{:.2}", distance(&counts, p1, p2))),
            );
            row
        })
        .collect();

    Some(format!("\nDistance Matrix\n{}", table(&headers, &rows)))
}

/// The annotated directory view of the code base.
///
/// Every file shows its SLOC and the platform sets that cover it;
/// `prune` drops files no platform reaches, `max_depth` limits the
/// directory depth shown.
pub fn tree_view(
    setmap: &SetMap,
    root: &Path,
    prune: bool,
    max_depth: Option<usize>,
) -> String {
    #[derive(Default)]
    struct DirNode {
        dirs: BTreeMap<String, DirNode>,
        files: Vec<(String, String)>,
    }

    let mut top = DirNode::default();
    for (path, coverage) in setmap.files() {
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let covered: u64 = coverage
            .lines
            .values()
            .filter(|set| !set.is_empty())
            .count() as u64;
        if prune && covered == 0 {
            continue;
        }

        // Count lines per distinct platform set within this file.
        let mut per_set: BTreeMap<Vec<String>, u64> = BTreeMap::new();
        for set in coverage.lines.values() {
            *per_set
                .entry(set.iter().cloned().collect::<Vec<String>>())
                .or_default() += 1;
        }
        let mut annotation: Vec<String> = Vec::new();
        for (set, count) in &per_set {
            annotation.push(format!("{}:{count}", set_name(set)));
        }
        let label = format!(
            "[{} SLOC; {}]",
            coverage.lines.len(),
            annotation.join(" ")
        );

        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        let Some((file_name, dirs)) = components.split_last() else {
            continue;
        };
        let mut node = &mut top;
        for dir in dirs {
            node = node.dirs.entry(dir.clone()).or_default();
        }
        node.files.push((file_name.clone(), label));
    }

    fn render(node: &DirNode, prefix: &str, depth: usize, max_depth: Option<usize>, out: &mut String) {
        if let Some(limit) = max_depth {
            if depth >= limit {
                return;
            }
        }
        let dir_count = node.dirs.len();
        let total = dir_count + node.files.len();
        let mut index = 0;
        for (name, child) in &node.dirs {
            index += 1;
            let last = index == total;
            let connector = if last { "└── " } else { "├── " };
            let _ = writeln!(out, "{prefix}{connector}{name}/");
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            render(child, &child_prefix, depth + 1, max_depth, out);
        }
        for (name, label) in &node.files {
            index += 1;
            let connector = if index == total { "└── " } else { "├── " };
            let _ = writeln!(out, "{prefix}{connector}{name} {label}");
        }
    }

    let mut out = format!("{}/\n", root.display());
    render(&top, "", 0, max_depth, &mut out);
    out.trim_end().to_string()
}

/// Coverage export: one record per code-base file with the physical
/// lines used by any platform, identified by content hash.
pub fn coverage(setmap: &SetMap, codebase: &CodeBase) -> serde_json::Value {
    let mut records = Vec::new();
    for (path, file_coverage) in setmap.files() {
        if codebase.is_excluded(path) {
            continue;
        }
        let lines: Vec<u32> = file_coverage
            .lines
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(line, _)| *line)
            .collect();

        let digest = match std::fs::read(path) {
            Ok(bytes) => format!("{:x}", Sha512::digest(&bytes)),
            Err(error) => {
                log::warn!("couldn't hash {}: {error}", path.display());
                continue;
            }
        };
        records.push(json!({
            "file": relative_name(path, codebase.root()),
            "id": digest,
            "lines": lines,
        }));
    }
    serde_json::Value::Array(records)
}

fn relative_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
