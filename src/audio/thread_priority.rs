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
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

const PRIORITY_VAR: &str = "SOUNDCORE_THREAD_PRIORITY";
const DISABLE_RT_VAR: &str = "SOUNDCORE_DISABLE_RT_AUDIO";

/// Priority for the render callback thread when SOUNDCORE_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// Reads SOUNDCORE_THREAD_PRIORITY (0-99) once, before the stream is built, so the
/// callback never touches the environment.
pub fn callback_thread_priority() -> ThreadPriority {
    let value = std::env::var(PRIORITY_VAR)
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_CALLBACK_THREAD_PRIORITY);
    ThreadPriorityValue::try_from(value)
        .map(ThreadPriority::Crossplatform)
        .unwrap_or(ThreadPriority::Max)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Whether to attempt SCHED_FIFO for the render callback thread. Enabled unless
/// SOUNDCORE_DISABLE_RT_AUDIO is set.
pub fn rt_audio_enabled() -> bool {
    !env_flag(DISABLE_RT_VAR)
}

/// Raises the calling thread's priority the first time it is called for a thread.
pub fn configure_audio_thread_priority(
    priority: ThreadPriority,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    *priority_set = true;

    if let Err(e) = set_current_thread_priority(priority) {
        warn!(error = ?e, "Failed to raise render thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled RT SCHED_FIFO for render thread"),
            Err(e) => warn!(error = %e, "Failed to set RT SCHED_FIFO for render thread"),
        }
    }

    #[cfg(not(unix))]
    let _ = rt_audio;
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_callback_thread_priority_from_env() {
        std::env::remove_var(PRIORITY_VAR);
        assert_eq!(
            callback_thread_priority(),
            ThreadPriority::Crossplatform(ThreadPriorityValue::try_from(70u8).unwrap())
        );

        std::env::set_var(PRIORITY_VAR, "42");
        assert_eq!(
            callback_thread_priority(),
            ThreadPriority::Crossplatform(ThreadPriorityValue::try_from(42u8).unwrap())
        );

        // Out of range and garbage fall back to the default.
        for value in ["150", "high"] {
            std::env::set_var(PRIORITY_VAR, value);
            assert_eq!(
                callback_thread_priority(),
                ThreadPriority::Crossplatform(ThreadPriorityValue::try_from(70u8).unwrap())
            );
        }
        std::env::remove_var(PRIORITY_VAR);
    }

    #[test]
    #[serial]
    fn test_rt_audio_flag() {
        std::env::remove_var(DISABLE_RT_VAR);
        assert!(rt_audio_enabled());
        for value in ["1", "TRUE", "yes", "on"] {
            std::env::set_var(DISABLE_RT_VAR, value);
            assert!(!rt_audio_enabled(), "{} should disable", value);
        }
        std::env::set_var(DISABLE_RT_VAR, "0");
        assert!(rt_audio_enabled());
        std::env::remove_var(DISABLE_RT_VAR);
    }
}
