//! Lazy, paginated audit queries.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use kyc_core::{ActionKind, SubjectAddress, Timestamp};

use crate::event::AuditEvent;
use crate::recorder::{AuditIndex, AuditStatus};

/// Predicates applied to each candidate event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Keep only these action kinds. Empty keeps all.
    #[serde(default)]
    pub actions: Vec<ActionKind>,
    /// Keep events at or after this time.
    #[serde(default)]
    pub since: Option<Timestamp>,
    /// Keep events strictly before this time.
    #[serde(default)]
    pub until: Option<Timestamp>,
    /// Drop events whose ledger append is still a gap.
    #[serde(default)]
    pub recorded_only: bool,
}

impl AuditFilter {
    /// Filter on a single action kind.
    pub fn action(action: ActionKind) -> Self {
        Self {
            actions: vec![action],
            ..Self::default()
        }
    }

    fn matches(&self, event: &AuditEvent, status: AuditStatus) -> bool {
        (self.actions.is_empty() || self.actions.contains(&event.action))
            && self.since.map_or(true, |t| event.timestamp >= t)
            && self.until.map_or(true, |t| event.timestamp < t)
            && (!self.recorded_only || status == AuditStatus::Recorded)
    }
}

/// Finite, forward-only sequence of matching events.
///
/// Pages are pulled from the index on demand, one read lock per page. The
/// upper bound is fixed when the query is created, so events recorded
/// afterwards are not yielded.
#[derive(Debug)]
pub struct AuditQuery {
    index: Arc<RwLock<AuditIndex>>,
    subject: SubjectAddress,
    filter: AuditFilter,
    remaining: usize,
    page_size: usize,
    cursor: usize,
    end: usize,
    buffer: VecDeque<AuditEvent>,
}

impl AuditQuery {
    pub(crate) fn new(
        index: Arc<RwLock<AuditIndex>>,
        subject: SubjectAddress,
        filter: AuditFilter,
        limit: usize,
        page_size: usize,
        end: usize,
    ) -> Self {
        Self {
            index,
            subject,
            filter,
            remaining: limit,
            page_size,
            cursor: 0,
            end,
            buffer: VecDeque::new(),
        }
    }

    /// Pull the next page into the buffer. Returns false when exhausted.
    fn fill(&mut self) -> bool {
        let want = self.page_size.min(self.remaining);
        let index = self.index.read();
        while self.cursor < self.end && self.buffer.len() < want {
            if let Some(entry) = index.events.get(self.cursor) {
                if entry.event.subject == self.subject && self.filter.matches(&entry.event, entry.status) {
                    self.buffer.push_back(entry.event.clone());
                }
            }
            self.cursor += 1;
        }
        !self.buffer.is_empty()
    }
}

impl Iterator for AuditQuery {
    type Item = AuditEvent;

    fn next(&mut self) -> Option<AuditEvent> {
        if self.remaining == 0 {
            return None;
        }
        if self.buffer.is_empty() && !self.fill() {
            return None;
        }
        let event = self.buffer.pop_front()?;
        self.remaining -= 1;
        Some(event)
    }
}
