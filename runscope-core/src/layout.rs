//! Column layout for sections
//!
//! Sections are spans over the message axis and are drawn as brackets next to
//! the messages they cover. Overlapping sections must not share a column, so
//! each section is assigned a column as it arrives:
//!
//! 1. Normalize the span to a half-open interval `[from, to)`, with an open
//!    section extending to [`OPEN_END`].
//! 2. If the section is already placed, remove it first so it cannot block
//!    its own re-placement.
//! 3. Put it into the first column (in creation order) where it overlaps
//!    nothing; otherwise open a new column.
//!
//! This is first-fit interval coloring. It always yields a conflict-free
//! assignment and is deterministic for a given arrival order, but it does not
//! minimize the number of columns when sections arrive out of order.
//!
//! Columns are never removed once created (until [`SectionLayout::reset`]),
//! so a section never moves sideways because another one was redefined.

use std::collections::HashMap;

use crate::types::{MessageId, Section, SectionId};

/// Upper bound used for sections that are still open.
pub const OPEN_END: MessageId = MessageId::MAX;

/// A half-open span `[from, to)` of message ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub from: MessageId,
    pub to: MessageId,
}

impl Interval {
    pub fn new(from: MessageId, to: MessageId) -> Self {
        Self { from, to }
    }

    /// The interval a section occupies.
    pub fn of_section(section: &Section) -> Self {
        Self::new(section.from_message, section.to_message.unwrap_or(OPEN_END))
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.from < other.to && other.from < self.to
    }

    pub fn contains(&self, message_id: MessageId) -> bool {
        self.from <= message_id && message_id < self.to
    }

    pub fn is_open_ended(&self) -> bool {
        self.to == OPEN_END
    }
}

/// Where a section ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub column: usize,
    /// Index within the column at the time of placement.
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    section_id: SectionId,
    interval: Interval,
}

/// One column of non-overlapping intervals.
#[derive(Debug, Clone, Default)]
pub struct Column {
    slots: Vec<Slot>,
}

impl Column {
    fn fits(&self, interval: &Interval) -> bool {
        !self.slots.iter().any(|slot| slot.interval.overlaps(interval))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Placed sections in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SectionId, Interval)> + '_ {
        self.slots.iter().map(|slot| (slot.section_id, slot.interval))
    }
}

/// Column assignment for the sections of one run.
#[derive(Debug, Clone, Default)]
pub struct SectionLayout {
    columns: Vec<Column>,
    placements: HashMap<SectionId, Placement>,
}

impl SectionLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place (or re-place) a section.
    pub fn place_section(&mut self, section: &Section) -> Placement {
        self.place(section.id, Interval::of_section(section))
    }

    /// Place (or re-place) an interval under the given section id.
    pub fn place(&mut self, section_id: SectionId, interval: Interval) -> Placement {
        self.remove_section(section_id);

        let slot = Slot {
            section_id,
            interval,
        };

        let placement = match self.columns.iter().position(|column| column.fits(&interval)) {
            Some(column) => {
                let slots = &mut self.columns[column].slots;
                slots.push(slot);
                Placement {
                    column,
                    position: slots.len() - 1,
                }
            }
            None => {
                self.columns.push(Column { slots: vec![slot] });
                tracing::debug!(
                    section_id,
                    columns = self.columns.len(),
                    "Added section column"
                );
                Placement {
                    column: self.columns.len() - 1,
                    position: 0,
                }
            }
        };

        self.placements.insert(section_id, placement);
        placement
    }

    /// Remove a section, returning the interval it occupied.
    ///
    /// The slot is found by section id; stored positions go stale as soon as
    /// an earlier slot in the same column is removed.
    pub fn remove_section(&mut self, section_id: SectionId) -> Option<Interval> {
        let placement = self.placements.remove(&section_id)?;
        let slots = &mut self.columns.get_mut(placement.column)?.slots;
        let index = slots.iter().position(|slot| slot.section_id == section_id)?;
        Some(slots.remove(index).interval)
    }

    pub fn placement(&self, section_id: SectionId) -> Option<Placement> {
        self.placements.get(&section_id).copied()
    }

    pub fn interval(&self, section_id: SectionId) -> Option<Interval> {
        let placement = self.placements.get(&section_id)?;
        self.columns
            .get(placement.column)?
            .iter()
            .find(|(id, _)| *id == section_id)
            .map(|(_, interval)| interval)
    }

    /// Number of columns created so far.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn section_count(&self) -> usize {
        self.placements.len()
    }

    /// Sections covering a message, as `(column, section id, interval)`.
    pub fn covering(
        &self,
        message_id: MessageId,
    ) -> impl Iterator<Item = (usize, SectionId, Interval)> + '_ {
        self.columns
            .iter()
            .enumerate()
            .flat_map(move |(column, col)| {
                col.iter()
                    .filter(move |(_, interval)| interval.contains(message_id))
                    .map(move |(id, interval)| (column, id, interval))
            })
    }

    pub fn reset(&mut self) {
        self.columns.clear();
        self.placements.clear();
    }
}
