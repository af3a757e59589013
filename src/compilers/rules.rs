// SPDX-License-Identifier: GPL-3.0-or-later

//! Argument parsing rules for compiler command lines.
//!
//! Two matchers cooperate: a fixed matcher for the arguments every
//! compiler shares (`-D`, `-U`, `-I`, `-isystem`, `-include`), and
//! configurable rules from the per-compiler specification. Rule actions
//! form a closed set; there is deliberately no escape hatch into
//! arbitrary behavior.

use serde::Deserialize;
use std::collections::BTreeMap;

/// The destination buckets a parse fills in.
#[derive(Debug, Default, Clone)]
pub struct Buckets {
    lists: BTreeMap<String, Vec<String>>,
    switches: BTreeMap<String, bool>,
}

impl Buckets {
    pub fn list(&self, dest: &str) -> &[String] {
        self.lists.get(dest).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn switch(&self, dest: &str) -> bool {
        self.switches.get(dest).copied().unwrap_or(false)
    }

    pub fn append(&mut self, dest: &str, value: String) {
        self.lists.entry(dest.to_string()).or_default().push(value);
    }

    pub fn replace(&mut self, dest: &str, values: Vec<String>) {
        self.lists.insert(dest.to_string(), values);
    }

    pub fn set_switch(&mut self, dest: &str, value: bool) {
        self.switches.insert(dest.to_string(), value);
    }
}

/// What a matched rule does with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StoreConst,
    AppendConst,
    Store,
    Append,
    StoreSplit,
    StoreTrue,
    StoreFalse,
}

impl Action {
    /// Whether the flag consumes a value (attached with `=` or as the
    /// next argument).
    fn takes_value(self) -> bool {
        matches!(self, Action::Store | Action::Append | Action::StoreSplit)
    }
}

/// One configurable parser rule from a compiler specification.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParserRule {
    pub flags: Vec<String>,
    pub action: Action,
    pub dest: String,
    /// Fixed value for the `*_const` actions.
    #[serde(default, rename = "const")]
    pub const_value: Option<String>,
    /// Separator for `store_split`.
    #[serde(default)]
    pub sep: Option<String>,
    /// Template applied to each value; `$value` is substituted.
    #[serde(default)]
    pub format: Option<String>,
    /// Later occurrences replace earlier ones.
    #[serde(default)]
    pub r#override: bool,
}

impl ParserRule {
    /// Try to match this rule at the head of `args`. Returns the number
    /// of arguments consumed.
    pub fn try_match(&self, args: &[String], buckets: &mut Buckets) -> Option<usize> {
        let head = args.first()?;
        for flag in &self.flags {
            if head == flag {
                if self.action.takes_value() {
                    let value = args.get(1)?.clone();
                    self.apply(Some(value), buckets);
                    return Some(2);
                }
                self.apply(None, buckets);
                return Some(1);
            }
            if self.action.takes_value() {
                if let Some(value) = head.strip_prefix(&format!("{flag}=")) {
                    self.apply(Some(value.to_string()), buckets);
                    return Some(1);
                }
            }
        }
        None
    }

    fn apply(&self, value: Option<String>, buckets: &mut Buckets) {
        match self.action {
            Action::StoreTrue => buckets.set_switch(&self.dest, true),
            Action::StoreFalse => buckets.set_switch(&self.dest, false),
            Action::StoreConst | Action::AppendConst => {
                let Some(const_value) = &self.const_value else {
                    log::warn!("rule for {:?} has no 'const' value", self.flags);
                    return;
                };
                if self.action == Action::StoreConst || self.r#override {
                    buckets.replace(&self.dest, vec![const_value.clone()]);
                } else {
                    buckets.append(&self.dest, const_value.clone());
                }
            }
            Action::Store | Action::Append => {
                let value = self.formatted(value.unwrap_or_default());
                if self.action == Action::Store || self.r#override {
                    buckets.replace(&self.dest, vec![value]);
                } else {
                    buckets.append(&self.dest, value);
                }
            }
            Action::StoreSplit => {
                let raw = value.unwrap_or_default();
                let pieces: Vec<String> = match &self.sep {
                    Some(sep) => raw.split(sep.as_str()).map(str::to_string).collect(),
                    None => vec![raw],
                };
                let formatted: Vec<String> =
                    pieces.into_iter().map(|p| self.formatted(p)).collect();
                if self.r#override {
                    buckets.replace(&self.dest, formatted);
                } else {
                    for piece in formatted {
                        buckets.append(&self.dest, piece);
                    }
                }
            }
        }
    }

    fn formatted(&self, value: String) -> String {
        match &self.format {
            Some(template) => template.replace("$value", &value),
            None => value,
        }
    }
}

/// Recognise the preprocessor arguments shared by every compiler:
/// `-D`/`-U` (glued or separate), `-I`/`-isystem` (glued or separate)
/// and `-include` (separate). Returns the number of arguments consumed.
pub fn match_common(args: &[String], buckets: &mut Buckets) -> Option<usize> {
    let head = args.first()?;

    // Longest flags first so `-isystem` wins over `-I`.
    if let Some(consumed) = glued_or_separate(head, args, "-isystem") {
        buckets.append("include_paths", consumed.0);
        return Some(consumed.1);
    }
    if head == "-include" {
        let value = args.get(1)?.clone();
        buckets.append("include_files", value);
        return Some(2);
    }
    if let Some(consumed) = glued_or_separate(head, args, "-D") {
        buckets.append("defines", consumed.0);
        return Some(consumed.1);
    }
    if let Some(consumed) = glued_or_separate(head, args, "-U") {
        buckets.append("undefines", consumed.0);
        return Some(consumed.1);
    }
    if let Some(consumed) = glued_or_separate(head, args, "-I") {
        buckets.append("include_paths", consumed.0);
        return Some(consumed.1);
    }
    None
}

/// Match `-Xvalue` or `-X value`, returning the value and the number of
/// arguments consumed.
fn glued_or_separate(head: &str, args: &[String], flag: &str) -> Option<(String, usize)> {
    if head == flag {
        return args.get(1).map(|v| (v.clone(), 2));
    }
    head.strip_prefix(flag).map(|v| (v.to_string(), 1))
}
