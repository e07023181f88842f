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
use crate::resource::ResourceLoadError;

/// Errors from synthesis engines and the adapter around them.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("synthesis engine is not available")]
    EngineUnavailable,

    #[error("no voice bank is loaded")]
    NoBankLoaded,

    #[error("bank {bank} patch {patch} is not available")]
    ProgramUnavailable { bank: u32, patch: u32 },

    #[error("failed to load voice bank: {0}")]
    Load(#[from] ResourceLoadError),

    #[error("synthesis engine error: {0}")]
    Engine(String),
}
