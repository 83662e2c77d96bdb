//! `updraft compare`: order two version strings.
//!
//! ```bash
//! $ updraft compare 1.0.0.0 1.0.0.0-beta.5
//! greater
//! ```

use crate::version::VersionComparator;
use anyhow::Result;
use clap::Args;
use std::cmp::Ordering;

#[derive(Args, Debug)]
pub struct CompareCommand {
    /// Left-hand version
    #[arg(value_name = "A")]
    pub a: String,

    /// Right-hand version
    #[arg(value_name = "B")]
    pub b: String,
}

impl CompareCommand {
    pub fn execute(&self) -> Result<()> {
        let ordering = VersionComparator::compare(&self.a, &self.b)?;
        println!("{}", describe(ordering));
        Ok(())
    }
}

/// `less`, `equal` or `greater`, describing `A` relative to `B`.
#[must_use]
pub const fn describe(ordering: Ordering) -> &'static str {
    match ordering {
        Ordering::Less => "less",
        Ordering::Equal => "equal",
        Ordering::Greater => "greater",
    }
}
