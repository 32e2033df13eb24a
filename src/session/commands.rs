use crate::protocol::{Command, Destination, Inbound, Params, SequenceGenerator, SequenceId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A command that was written to the control channel and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Command name.
    pub name: Cow<'static, str>,
    /// When it was written.
    pub sent_at: Instant,
}

/// Builds commands and correlates responses with them.
#[derive(Debug)]
pub(crate) struct CommandEngine {
    generator: SequenceGenerator,
    source: Cow<'static, str>,
    pending: HashMap<SequenceId, PendingCommand>,
}

impl CommandEngine {
    pub(crate) fn new(first_sequence_id: u64, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            generator: SequenceGenerator::starting_at(first_sequence_id),
            source: source.into(),
            pending: HashMap::new(),
        }
    }

    /// Build a command, consuming the next sequence id.
    pub(crate) fn build(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        destination: Destination,
        params: Params,
    ) -> Command {
        Command {
            name: name.into(),
            destination,
            sequence_id: self.generator.next_id(),
            source: self.source.clone(),
            params,
        }
    }

    /// Remember a command that has actually been written.
    pub(crate) fn record(&mut self, command: &Command, now: Instant) {
        let previous = self.pending.insert(
            command.sequence_id,
            PendingCommand {
                name: command.name.clone(),
                sent_at: now,
            },
        );
        debug_assert!(previous.is_none(), "sequence ids are unique");
    }

    /// Find and forget the command a response answers.
    ///
    /// Responses carrying a `SequenceID` are matched by it alone. Responses
    /// without one fall back to the oldest pending command with the same name.
    pub(crate) fn resolve(&mut self, response: &Inbound) -> Option<(SequenceId, PendingCommand)> {
        if let Some(id) = response.sequence_id {
            return self.pending.remove_entry(&id);
        }
        let id = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.name == response.command.as_str())
            .map(|(&id, _)| id)
            .min()?;
        self.pending.remove_entry(&id)
    }

    /// Drop commands older than `ttl`, returning how many were dropped.
    pub(crate) fn expire(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.pending.len();
        self.pending.retain(|id, pending| {
            let fresh = now.saturating_duration_since(pending.sent_at) < ttl;
            if !fresh {
                tracing::debug!(%id, name = %pending.name, "Forgetting unanswered command");
            }
            fresh
        });
        before - self.pending.len()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn next_sequence_id(&self) -> SequenceId {
        self.generator.peek()
    }
}
