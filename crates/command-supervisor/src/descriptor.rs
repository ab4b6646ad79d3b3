//! The three standard streams of a process

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of a process's standard streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Descriptor {
    /// Standard input
    Stdin,
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl Descriptor {
    /// All descriptors, in launch order
    pub const ALL: [Descriptor; 3] = [Descriptor::Stdin, Descriptor::Stdout, Descriptor::Stderr];

    /// Position of this descriptor in [`Descriptor::ALL`]
    pub fn index(self) -> usize {
        match self {
            Descriptor::Stdin => 0,
            Descriptor::Stdout => 1,
            Descriptor::Stderr => 2,
        }
    }

    /// Returns true if the child reads from this stream
    pub fn is_input(self) -> bool {
        self == Descriptor::Stdin
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Descriptor::Stdin => "stdin",
            Descriptor::Stdout => "stdout",
            Descriptor::Stderr => "stderr",
        };
        f.write_str(name)
    }
}
