//! One analyzer channel: Idle → Scheduled → Running → Idle.

use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use anchor::Channel;

use super::trigger::TriggerReason;
use crate::config::ChannelSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Scheduled { deadline: Instant, reason: TriggerReason },
    Running { revision: u64, reason: TriggerReason },
}

/// Whether a finished run is still the one the channel is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Current,
    Stale,
}

#[derive(Debug)]
pub struct ChannelMachine {
    channel: Channel,
    settings: ChannelSettings,
    state: ChannelState,
    /// Last revision handed out by `begin`.
    revision: u64,
    abort: Option<AbortHandle>,
    last_immediate: Option<Instant>,
}

impl ChannelMachine {
    pub fn new(channel: Channel, settings: ChannelSettings) -> Self {
        Self {
            channel,
            settings,
            state: ChannelState::Idle,
            revision: 0,
            abort: None,
            last_immediate: None,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_idle(&self) -> bool {
        self.state == ChannelState::Idle
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ChannelState::Scheduled { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    /// Abort any in-flight call and clear the pending timer.
    pub fn cancel(&mut self) -> bool {
        if let Some(handle) = self.abort.take() {
            handle.abort();
        }
        let was_active = self.state != ChannelState::Idle;
        if let ChannelState::Running { revision, .. } = self.state {
            debug!(channel = %self.channel, revision, "check_cancelled");
        }
        self.state = ChannelState::Idle;
        was_active
    }

    /// Schedule a run `debounce` from now, replacing whatever was pending.
    pub fn schedule(&mut self, reason: TriggerReason, now: Instant) {
        self.cancel();
        self.state = ChannelState::Scheduled {
            deadline: now + self.settings.debounce,
            reason,
        };
    }

    fn schedule_idle(&mut self, now: Instant) {
        if let Some(fallback) = self.settings.idle_fallback {
            self.state = ChannelState::Scheduled {
                deadline: now + fallback,
                reason: TriggerReason::Idle,
            };
        }
    }

    /// Feed a document mutation. `trigger` is the channel predicate's verdict.
    pub fn on_mutation(&mut self, trigger: Option<TriggerReason>, now: Instant) {
        let trigger = match trigger {
            Some(reason) if reason.is_immediate() => {
                if self.request_immediate(reason, now) {
                    return;
                }
                None
            }
            other => other,
        };

        match (trigger, self.state) {
            (Some(reason), _) => self.schedule(reason, now),
            (None, ChannelState::Running { .. }) => {
                // Resumed typing.
                self.cancel();
                self.schedule_idle(now);
            }
            (None, ChannelState::Scheduled { reason, .. }) => {
                let wait = match reason {
                    TriggerReason::Idle => self.settings.idle_fallback.unwrap_or(self.settings.debounce),
                    _ => self.settings.debounce,
                };
                self.state = ChannelState::Scheduled {
                    deadline: now + wait,
                    reason,
                };
            }
            (None, ChannelState::Idle) => self.schedule_idle(now),
        }
    }

    /// Run as soon as possible unless another immediate trigger fired within
    /// the cool-down. Returns `false` when throttled.
    pub fn request_immediate(&mut self, reason: TriggerReason, now: Instant) -> bool {
        let throttled = self
            .last_immediate
            .is_some_and(|last| now.saturating_duration_since(last) < self.settings.cooldown);
        if throttled {
            debug!(channel = %self.channel, reason = reason.as_str(), "trigger_throttled");
            return false;
        }
        self.last_immediate = Some(now);
        self.cancel();
        self.state = ChannelState::Scheduled {
            deadline: now,
            reason,
        };
        true
    }

    /// Move a due Scheduled channel to Running and hand out its revision.
    pub fn begin(&mut self, now: Instant) -> Option<(u64, TriggerReason)> {
        match self.state {
            ChannelState::Scheduled { deadline, reason } if deadline <= now => {
                self.revision += 1;
                self.state = ChannelState::Running {
                    revision: self.revision,
                    reason,
                };
                Some((self.revision, reason))
            }
            _ => None,
        }
    }

    /// Keep the abort handle of the call started for `revision`. A handle for
    /// a run that is no longer current is aborted on the spot.
    pub fn attach(&mut self, revision: u64, handle: AbortHandle) {
        match self.state {
            ChannelState::Running { revision: current, .. } if current == revision => {
                self.abort = Some(handle);
            }
            _ => handle.abort(),
        }
    }

    /// Close out a run. Only the current Running revision returns the
    /// channel to Idle.
    pub fn finish(&mut self, revision: u64) -> RunStatus {
        match self.state {
            ChannelState::Running { revision: current, .. } if current == revision => {
                self.abort = None;
                self.state = ChannelState::Idle;
                RunStatus::Current
            }
            _ => RunStatus::Stale,
        }
    }
}
