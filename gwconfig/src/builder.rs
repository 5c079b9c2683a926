// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Line-oriented config text builder

use std::fmt::Display;
use std::ops::AddAssign;

/// FRR stanza separator. Consecutive markers collapse into one.
pub const MARKER: &str = "!";

#[derive(Debug, Default)]
/// Object to ease building appliance configs.
pub struct ConfigBuilder {
    lines: Vec<String>,
}

/// Impl Display for [`ConfigBuilder`]. This provides `to_string()`.
impl Display for ConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for s in &self.lines {
            writeln!(f, "{s}")?;
        }
        Ok(())
    }
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    fn append(&mut self, stanza: &str) {
        match self.lines.last() {
            Some(x) if x == MARKER && stanza == MARKER => {}
            _ => self.lines.push(stanza.to_owned()),
        }
    }
    fn merge(&mut self, other: &mut Self) {
        self.lines.append(&mut other.lines);
        self.lines.dedup_by(|a, b| a == b && a == MARKER);
    }
    /// Append `line` indented by `depth` tabs.
    pub fn indented(&mut self, depth: usize, line: &str) {
        self.append(&format!("{}{line}", "\t".repeat(depth)));
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Make it very easy to add config lines to a [`ConfigBuilder`]
impl AddAssign<Self> for ConfigBuilder {
    fn add_assign(&mut self, mut rhs: Self) {
        self.merge(&mut rhs);
    }
}
impl AddAssign<String> for ConfigBuilder {
    fn add_assign(&mut self, rhs: String) {
        self.append(&rhs);
    }
}
impl AddAssign<&str> for ConfigBuilder {
    fn add_assign(&mut self, rhs: &str) {
        self.append(rhs);
    }
}

/// Main trait to render appliance configs
pub trait Render {
    type Context; /* context passed to renderer */
    type Output; /* type of output produced */
    fn render(&self, ctx: &Self::Context) -> Self::Output;
}
