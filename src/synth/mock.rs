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
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use super::engine::{BankId, SynthBackend, SynthEngine};
use super::SynthError;
use crate::audio::Frame;
use crate::resource::ResourceLoadError;

/// Level every mock engine renders, so tests can tell audible output from silence.
pub const MOCK_LEVEL: f32 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateEngine {
        sample_rate: u32,
    },
    AddBank {
        path: PathBuf,
        id: BankId,
    },
    RemoveBank {
        id: BankId,
    },
    SelectProgram {
        channel: u8,
        bank_id: BankId,
        bank: u32,
        patch: u32,
    },
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
}

type DropHook = Arc<dyn Fn() + Send + Sync>;

pub struct MockBank {
    path: PathBuf,
    on_drop: Option<DropHook>,
}

impl Drop for MockBank {
    fn drop(&mut self) {
        if let Some(hook) = &self.on_drop {
            hook();
        }
    }
}

/// A backend that records every engine call.
pub struct MockBackend {
    calls: Arc<Mutex<Vec<MockCall>>>,
    bank_loads: AtomicUsize,
    fail_engine: AtomicBool,
    /// Signals a started load and waits for a release before returning.
    load_gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
    bank_drop_hook: Mutex<Option<DropHook>>,
}

impl MockBackend {
    pub fn new() -> MockBackend {
        MockBackend {
            calls: Arc::new(Mutex::new(Vec::new())),
            bank_loads: AtomicUsize::new(0),
            fail_engine: AtomicBool::new(false),
            load_gate: Mutex::new(None),
            bank_drop_hook: Mutex::new(None),
        }
    }

    /// Makes loads of paths starting with "slow" block until released. Returns a
    /// receiver that sees each blocked load start and a sender that releases one.
    pub fn gate_slow_loads(&self) -> (Receiver<()>, Sender<()>) {
        let (started_tx, started_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        *self.load_gate.lock() = Some((started_tx, release_rx));
        (started_rx, release_tx)
    }

    /// Runs `hook` whenever a bank loaded after this call is destroyed.
    pub fn on_bank_drop<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        *self.bank_drop_hook.lock() = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn calls_matching<F: Fn(&MockCall) -> bool>(&self, f: F) -> usize {
        self.calls.lock().iter().filter(|c| f(c)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn bank_loads(&self) -> usize {
        self.bank_loads.load(Ordering::SeqCst)
    }

    pub fn fail_engine_creation(&self, fail: bool) {
        self.fail_engine.store(fail, Ordering::SeqCst);
    }
}

impl SynthBackend for MockBackend {
    type Bank = MockBank;
    type Engine = MockEngine;

    fn name(&self) -> &str {
        "mock"
    }

    /// Any path whose name starts with "missing" fails to load.
    fn load_bank(&self, path: &Path) -> Result<MockBank, ResourceLoadError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if name.starts_with("missing") {
            return Err(ResourceLoadError::Other(format!(
                "{} not found",
                path.display()
            )));
        }
        if name.starts_with("slow") {
            let gate = self.load_gate.lock().clone();
            if let Some((started, release)) = gate {
                let _ = started.send(());
                let _ = release.recv();
            }
        }
        self.bank_loads.fetch_add(1, Ordering::SeqCst);
        Ok(MockBank {
            path: path.to_path_buf(),
            on_drop: self.bank_drop_hook.lock().clone(),
        })
    }

    fn create_engine(&self, sample_rate: u32) -> Result<MockEngine, SynthError> {
        if self.fail_engine.load(Ordering::SeqCst) {
            return Err(SynthError::Engine("engine creation disabled".to_string()));
        }
        self.calls
            .lock()
            .push(MockCall::CreateEngine { sample_rate });
        Ok(MockEngine {
            sample_rate,
            calls: self.calls.clone(),
            banks: HashMap::new(),
            next_id: 1,
        })
    }
}

pub struct MockEngine {
    sample_rate: u32,
    calls: Arc<Mutex<Vec<MockCall>>>,
    banks: HashMap<BankId, Arc<MockBank>>,
    next_id: BankId,
}

impl SynthEngine for MockEngine {
    type Bank = MockBank;

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn add_bank(&mut self, bank: Arc<MockBank>) -> Result<BankId, SynthError> {
        let id = self.next_id;
        self.next_id += 1;
        self.calls.lock().push(MockCall::AddBank {
            path: bank.path.clone(),
            id,
        });
        self.banks.insert(id, bank);
        Ok(id)
    }

    fn remove_bank(&mut self, id: BankId) {
        self.banks.remove(&id);
        self.calls.lock().push(MockCall::RemoveBank { id });
    }

    fn select_program(
        &mut self,
        channel: u8,
        bank_id: BankId,
        bank: u32,
        patch: u32,
    ) -> Result<(), SynthError> {
        if !self.banks.contains_key(&bank_id) || patch > 127 {
            return Err(SynthError::ProgramUnavailable { bank, patch });
        }
        self.calls.lock().push(MockCall::SelectProgram {
            channel,
            bank_id,
            bank,
            patch,
        });
        Ok(())
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.calls.lock().push(MockCall::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        self.calls.lock().push(MockCall::NoteOff { channel, note });
    }

    fn write(&mut self, out: &mut [Frame]) {
        out.fill([MOCK_LEVEL; 2]);
    }
}
