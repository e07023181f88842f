// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use serde::{Deserialize, Serialize};

/// Sentinel for a bank or patch index that has not been set.
pub const UNSET_INDEX: i32 = -1;

/// Renders a bank or patch index for display, `---` when unset.
pub fn display_index(index: i32) -> String {
    if index < 0 {
        "---".to_string()
    } else {
        index.to_string()
    }
}

/// The persisted parameters of a synth instrument.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct InstrumentSettings {
    /// The voice bank file. Empty when no file was loaded.
    #[serde(default)]
    pub src: String,

    #[serde(default = "unset")]
    pub bank: i32,

    #[serde(default = "unset")]
    pub patch: i32,
}

fn unset() -> i32 {
    UNSET_INDEX
}

impl InstrumentSettings {
    pub fn display_bank(&self) -> String {
        display_index(self.bank)
    }

    pub fn display_patch(&self) -> String {
        display_index(self.patch)
    }
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        InstrumentSettings {
            src: String::new(),
            bank: UNSET_INDEX,
            patch: UNSET_INDEX,
        }
    }
}
