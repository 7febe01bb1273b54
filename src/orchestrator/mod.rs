//! Analyzer orchestration: one [`ChannelMachine`] per enabled channel.
//!
//! The orchestrator never talks to a provider itself. It decides *when* a
//! channel should run and which revision a returning outcome must carry to
//! be applied; the session spawns the calls and feeds the results back.

mod channel;
mod job;
mod trigger;

use std::collections::BTreeMap;

use anchor::{Channel, MutationEvent};
use tokio::task::AbortHandle;
use tokio::time::Instant;

pub use self::channel::{ChannelMachine, ChannelState, RunStatus};
pub use self::job::{call_with_timeout, spawn_job, CheckOutcome};
pub use self::trigger::{evaluate, TriggerReason};

use crate::config::ChannelSettings;
use crate::error::EngineError;

/// A channel that is due to run now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueRun {
    pub channel: Channel,
    pub revision: u64,
    pub reason: TriggerReason,
}

#[derive(Debug, Default)]
pub struct Orchestrator {
    machines: BTreeMap<Channel, ChannelMachine>,
}

impl Orchestrator {
    /// Build machines for the enabled channels in `channels`.
    pub fn new(channels: impl IntoIterator<Item = (Channel, ChannelSettings)>) -> Self {
        let machines = channels
            .into_iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(channel, settings)| (channel, ChannelMachine::new(channel, settings)))
            .collect();
        Self { machines }
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.machines.keys().copied()
    }

    pub fn machine(&self, channel: Channel) -> Option<&ChannelMachine> {
        self.machines.get(&channel)
    }

    pub fn settings(&self, channel: Channel) -> Option<&ChannelSettings> {
        self.machines.get(&channel).map(ChannelMachine::settings)
    }

    fn machine_mut(&mut self, channel: Channel) -> Result<&mut ChannelMachine, EngineError> {
        self.machines
            .get_mut(&channel)
            .ok_or(EngineError::UnknownChannel(channel))
    }

    /// Feed a mutation to every channel.
    pub fn on_mutation(&mut self, event: &MutationEvent, now: Instant) {
        for (channel, machine) in self.machines.iter_mut() {
            let trigger = evaluate(*channel, event, machine.settings().paste_threshold);
            machine.on_mutation(trigger, now);
        }
    }

    /// Immediate trigger on one channel. `Ok(false)` when throttled.
    pub fn request(&mut self, channel: Channel, reason: TriggerReason, now: Instant) -> Result<bool, EngineError> {
        Ok(self.machine_mut(channel)?.request_immediate(reason, now))
    }

    pub fn on_focus(&mut self, now: Instant) {
        for machine in self.machines.values_mut() {
            machine.request_immediate(TriggerReason::Focus, now);
        }
    }

    pub fn cancel(&mut self, channel: Channel) -> Result<bool, EngineError> {
        Ok(self.machine_mut(channel)?.cancel())
    }

    pub fn cancel_all(&mut self) {
        for machine in self.machines.values_mut() {
            machine.cancel();
        }
    }

    /// Cancel everything and schedule every channel with its debounce.
    pub fn reschedule_all(&mut self, now: Instant) {
        for machine in self.machines.values_mut() {
            machine.schedule(TriggerReason::Accept, now);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.machines.values().filter_map(ChannelMachine::deadline).min()
    }

    /// Start every channel whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<DueRun> {
        self.machines
            .iter_mut()
            .filter_map(|(channel, machine)| {
                machine.begin(now).map(|(revision, reason)| DueRun {
                    channel: *channel,
                    revision,
                    reason,
                })
            })
            .collect()
    }

    /// Start one channel if it is due.
    pub fn begin(&mut self, channel: Channel, now: Instant) -> Result<Option<DueRun>, EngineError> {
        Ok(self
            .machine_mut(channel)?
            .begin(now)
            .map(|(revision, reason)| DueRun {
                channel,
                revision,
                reason,
            }))
    }

    pub fn attach(&mut self, channel: Channel, revision: u64, handle: AbortHandle) {
        match self.machines.get_mut(&channel) {
            Some(machine) => machine.attach(revision, handle),
            None => handle.abort(),
        }
    }

    pub fn finish(&mut self, channel: Channel, revision: u64) -> RunStatus {
        self.machines
            .get_mut(&channel)
            .map_or(RunStatus::Stale, |machine| machine.finish(revision))
    }

    pub fn is_idle(&self) -> bool {
        self.machines.values().all(ChannelMachine::is_idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn all_channels() -> Orchestrator {
        Orchestrator::new(Channel::ALL.map(|c| (c, ChannelSettings::defaults_for(c))))
    }

    fn typed(preceding: char, inserted: &str) -> MutationEvent {
        MutationEvent {
            revision: 1,
            start: 5,
            removed: 0,
            inserted: inserted.into(),
            preceding: Some(preceding),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_channels_are_unknown() {
        let mut style = ChannelSettings::defaults_for(Channel::Style);
        style.enabled = false;
        let mut orchestrator = Orchestrator::new([
            (Channel::Spelling, ChannelSettings::defaults_for(Channel::Spelling)),
            (Channel::Style, style),
        ]);
        assert_eq!(
            orchestrator.request(Channel::Style, TriggerReason::Explicit, Instant::now()),
            Err(EngineError::UnknownChannel(Channel::Style))
        );
        assert_eq!(orchestrator.channels().collect::<Vec<_>>(), vec![Channel::Spelling]);
    }

    #[tokio::test(start_paused = true)]
    async fn word_boundary_schedules_spelling_first() {
        let mut orchestrator = all_channels();
        let now = Instant::now();
        orchestrator.on_mutation(&typed('d', " "), now);
        assert_eq!(orchestrator.next_deadline(), Some(now + Duration::from_millis(400)));

        let due = orchestrator.take_due(now + Duration::from_millis(400));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].channel, Channel::Spelling);
        assert!(!orchestrator.is_idle());

        assert_eq!(orchestrator.finish(Channel::Spelling, due[0].revision), RunStatus::Current);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_after_accept_uses_debounce() {
        let mut orchestrator = all_channels();
        let now = Instant::now();
        orchestrator.reschedule_all(now);
        assert_eq!(orchestrator.next_deadline(), Some(now + Duration::from_millis(400)));
        orchestrator.cancel_all();
        assert!(orchestrator.is_idle());
        assert_eq!(orchestrator.finish(Channel::Grammar, 99), RunStatus::Stale);
    }
}
