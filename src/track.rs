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

//! Track identity and mute state.
//!
//! Play handles never hold a reference to a track. They carry [`TrackId`]s and resolve
//! mute state through the [`TrackRegistry`], so deleting a track while its handles are
//! still draining is harmless.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

struct TrackState {
    name: String,
    muted: AtomicBool,
}

/// The set of live tracks and their mute flags.
///
/// Mute lookups take a read lock and an atomic load, so they are cheap enough for the
/// render thread.
#[derive(Default)]
pub struct TrackRegistry {
    tracks: RwLock<HashMap<TrackId, Arc<TrackState>>>,
}

impl TrackRegistry {
    pub fn new() -> TrackRegistry {
        TrackRegistry::default()
    }

    pub fn add_track(&self, name: &str) -> TrackId {
        let id = TrackId(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed));
        self.tracks.write().insert(
            id,
            Arc::new(TrackState {
                name: name.to_string(),
                muted: AtomicBool::new(false),
            }),
        );
        info!(track = %id, name, "Added track");
        id
    }

    /// Removes a track. Returns false if it was unknown.
    pub fn remove_track(&self, id: TrackId) -> bool {
        let removed = self.tracks.write().remove(&id).is_some();
        if removed {
            info!(track = %id, "Removed track");
        }
        removed
    }

    pub fn set_muted(&self, id: TrackId, muted: bool) {
        if let Some(track) = self.tracks.read().get(&id) {
            track.muted.store(muted, Ordering::Release);
            debug!(track = %id, muted, "Track mute changed");
        }
    }

    /// Unknown (e.g. already deleted) tracks count as not muted.
    pub fn is_muted(&self, id: TrackId) -> bool {
        self.tracks
            .read()
            .get(&id)
            .is_some_and(|track| track.muted.load(Ordering::Acquire))
    }

    pub fn name(&self, id: TrackId) -> Option<String> {
        self.tracks.read().get(&id).map(|track| track.name.clone())
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.read().contains_key(&id)
    }
}

/// Which track, and optionally which enclosing group track, a play handle came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Origin {
    pub track: Option<TrackId>,
    pub group: Option<TrackId>,
}

impl Origin {
    /// A handle that belongs to no track (e.g. a preview sample).
    pub const NONE: Origin = Origin {
        track: None,
        group: None,
    };

    pub fn track(track: TrackId) -> Origin {
        Origin {
            track: Some(track),
            group: None,
        }
    }

    pub fn in_group(track: TrackId, group: TrackId) -> Origin {
        Origin {
            track: Some(track),
            group: Some(group),
        }
    }

    /// True if `track` is either the immediate track or the group track.
    pub fn is_from(&self, track: TrackId) -> bool {
        self.track == Some(track) || self.group == Some(track)
    }

    /// True if the immediate track or the group track is muted.
    pub fn is_muted(&self, tracks: &TrackRegistry) -> bool {
        self.track.is_some_and(|id| tracks.is_muted(id))
            || self.group.is_some_and(|id| tracks.is_muted(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mute_lookup() {
        let tracks = TrackRegistry::new();
        let drums = tracks.add_track("drums");
        let group = tracks.add_track("beat+bassline");

        let origin = Origin::in_group(drums, group);
        assert!(!origin.is_muted(&tracks));

        tracks.set_muted(group, true);
        assert!(origin.is_muted(&tracks));
        assert!(!Origin::track(drums).is_muted(&tracks));

        tracks.set_muted(group, false);
        tracks.set_muted(drums, true);
        assert!(origin.is_muted(&tracks));
        assert!(!Origin::NONE.is_muted(&tracks));
    }

    #[test]
    fn test_deleted_track_is_not_muted() {
        let tracks = TrackRegistry::new();
        let id = tracks.add_track("vocals");
        tracks.set_muted(id, true);
        assert!(tracks.is_muted(id));

        assert!(tracks.remove_track(id));
        assert!(!tracks.remove_track(id));
        assert!(!tracks.is_muted(id));
        assert!(!Origin::track(id).is_muted(&tracks));
        assert_eq!(tracks.name(id), None);
    }

    #[test]
    fn test_is_from() {
        let tracks = TrackRegistry::new();
        let a = tracks.add_track("a");
        let b = tracks.add_track("b");
        let c = tracks.add_track("c");

        let origin = Origin::in_group(a, b);
        assert!(origin.is_from(a));
        assert!(origin.is_from(b));
        assert!(!origin.is_from(c));
        assert!(!Origin::NONE.is_from(a));
        assert_eq!(tracks.name(c).as_deref(), Some("c"));
    }
}
