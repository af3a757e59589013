// SPDX-License-Identifier: GPL-3.0-or-later

//! The specialization tree.
//!
//! One tree is built per source file. Inner nodes are `#if` groups and
//! include edges; leaves are contiguous ranges of code lines. The tree
//! is purely syntactic: conditions are stored as token lists and
//! `#include` arguments stay unresolved, so the same tree can be walked
//! under any platform configuration.

pub mod builder;
pub mod mapper;

pub use builder::build_tree;
pub use mapper::{PlatformWalker, SetMap};

use crate::preprocessor::{Directive, Token};
use std::path::PathBuf;

/// A contiguous run of code lines, uninterrupted by directives.
#[derive(Debug, Clone)]
pub struct CodeRange {
    pub start_line: u32,
    pub end_line: u32,
    /// The countable physical lines in the range.
    pub lines: Vec<u32>,
}

impl CodeRange {
    pub fn sloc(&self) -> u32 {
        self.lines.len() as u32
    }
}

/// A directive that is not part of the `#if` structure: `#define`,
/// `#undef`, `#pragma`, `#error`, `#warning`, `#line` or an unknown
/// directive.
#[derive(Debug, Clone)]
pub struct DirectiveNode {
    pub directive: Directive,
    pub start_line: u32,
    pub end_line: u32,
}

/// An `#include` whose target is resolved during the platform walk.
#[derive(Debug, Clone)]
pub struct IncludeNode {
    pub tokens: Vec<Token>,
    pub start_line: u32,
    pub end_line: u32,
}

/// The controlling condition of one branch of an `#if` group.
#[derive(Debug, Clone)]
pub enum Condition {
    Expr(Vec<Token>),
    Else,
}

/// One `#if`/`#elif`/`#else` arm and its body.
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: Condition,
    pub start_line: u32,
    pub body: Vec<Node>,
}

/// An ordered group of branches closed by `#endif`. At most one branch
/// is live per walk; with no `#else`, none may be.
#[derive(Debug, Clone)]
pub struct IfGroup {
    pub branches: Vec<Branch>,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone)]
pub enum Node {
    Code(CodeRange),
    Directive(DirectiveNode),
    If(IfGroup),
    Include(IncludeNode),
}

/// The tree for one source file.
#[derive(Debug, Clone)]
pub struct FileTree {
    pub path: PathBuf,
    pub root: Vec<Node>,
    /// The include-guard macro, when the whole file is wrapped in the
    /// classic `#ifndef G` / `#define G` / … / `#endif` pattern.
    pub guard: Option<String>,
    pub total_lines: u32,
    pub total_sloc: u32,
}

impl FileTree {
    /// Preorder traversal over all nodes.
    pub fn walk(&self) -> impl Iterator<Item = &Node> {
        let mut stack: Vec<&Node> = self.root.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            match node {
                Node::If(group) => {
                    for branch in group.branches.iter().rev() {
                        for child in branch.body.iter().rev() {
                            stack.push(child);
                        }
                    }
                }
                Node::Code(_) | Node::Directive(_) | Node::Include(_) => {}
            }
            Some(node)
        })
    }

    /// All countable code lines in the tree, in no particular order.
    pub fn code_lines(&self) -> Vec<u32> {
        let mut lines = Vec::new();
        for node in self.walk() {
            if let Node::Code(range) = node {
                lines.extend(range.lines.iter().copied());
            }
        }
        lines
    }
}
