//! Operating modes and the policy each one applies to a batch.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Closed set of operating modes selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// General coding assistant; interactive when no input is given.
    Code,
    /// Writes `.design` documents only.
    Design,
    /// Implements loaded `.design` documents.
    Craft,
    /// Diagnoses and fixes failures. Used for nested repair passes.
    Debug,
    /// Writes `.test` plans only.
    Test,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Code => "code",
            Mode::Design => "design",
            Mode::Craft => "craft",
            Mode::Debug => "debug",
            Mode::Test => "test",
        }
    }

    /// Extension every `create`/`edit` target must carry in this mode.
    pub fn required_extension(self) -> Option<&'static str> {
        match self {
            Mode::Design => Some(".design"),
            Mode::Test => Some(".test"),
            Mode::Code | Mode::Craft | Mode::Debug => None,
        }
    }

    /// Whether failed `run` actions hand over to the repair loop.
    pub fn permits_auto_repair(self) -> bool {
        matches!(self, Mode::Code | Mode::Craft)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
