//! Working memory: the fact set of one engine session.

use crate::fact::{Answer, Fact, FactKind, Flags, Message, Question};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of a fact within one session. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactHandle(u64);

impl FactHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f-{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    fact: Fact,
    /// Logical time of the last assert/modify; orders activations by recency.
    stamp: u64,
}

/// The facts currently held by a session.
#[derive(Debug, Clone, Default)]
pub struct WorkingMemory {
    entries: BTreeMap<FactHandle, Entry>,
    next_handle: u64,
    clock: u64,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, handle: FactHandle) -> Option<&Fact> {
        self.entries.get(&handle).map(|entry| &entry.fact)
    }

    pub fn contains(&self, handle: FactHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// All facts in assertion order.
    pub fn iter(&self) -> impl Iterator<Item = (FactHandle, &Fact)> {
        self.entries.iter().map(|(handle, entry)| (*handle, &entry.fact))
    }

    pub fn of_kind(&self, kind: FactKind) -> impl Iterator<Item = (FactHandle, &Fact)> {
        self.iter().filter(move |(_, fact)| fact.kind() == kind)
    }

    /// Handle of a fact equal to `fact`, if one is present.
    pub fn find(&self, fact: &Fact) -> Option<FactHandle> {
        self.of_kind(fact.kind())
            .find(|(_, candidate)| *candidate == fact)
            .map(|(handle, _)| handle)
    }

    pub fn messages(&self) -> impl Iterator<Item = (FactHandle, &Message)> {
        self.iter()
            .filter_map(|(handle, fact)| fact.as_message().map(|message| (handle, message)))
    }

    pub fn questions(&self) -> impl Iterator<Item = (FactHandle, &Question)> {
        self.iter()
            .filter_map(|(handle, fact)| fact.as_question().map(|question| (handle, question)))
    }

    pub fn answers(&self) -> impl Iterator<Item = (FactHandle, &Answer)> {
        self.iter()
            .filter_map(|(handle, fact)| fact.as_answer().map(|answer| (handle, answer)))
    }

    pub fn flags(&self) -> impl Iterator<Item = (FactHandle, &Flags)> {
        self.iter()
            .filter_map(|(handle, fact)| fact.as_flags().map(|flags| (handle, flags)))
    }

    pub(crate) fn stamp(&self, handle: FactHandle) -> Option<u64> {
        self.entries.get(&handle).map(|entry| entry.stamp)
    }

    pub(crate) fn insert(&mut self, fact: Fact) -> FactHandle {
        self.next_handle += 1;
        let handle = FactHandle(self.next_handle);
        let stamp = self.tick();
        self.entries.insert(handle, Entry { fact, stamp });
        handle
    }

    pub(crate) fn remove(&mut self, handle: FactHandle) -> Option<Fact> {
        self.entries.remove(&handle).map(|entry| entry.fact)
    }

    /// Replaces the fact behind `handle`, returning the previous value.
    pub(crate) fn replace(&mut self, handle: FactHandle, fact: Fact) -> Option<Fact> {
        let stamp = self.tick();
        let entry = self.entries.get_mut(&handle)?;
        entry.stamp = stamp;
        Some(std::mem::replace(&mut entry.fact, fact))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}
