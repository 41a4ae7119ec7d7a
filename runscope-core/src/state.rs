//! Viewer state
//!
//! [`ViewerState`] is the one place inbound events are applied. It owns the
//! run registry and, once a run is selected, a [`RunSession`] holding
//! everything scoped to that run. Switching runs replaces the session as a
//! whole, so no message, tool call or section of the old run can leak into
//! the new one.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::dispatch::{IgnoreReason, Outcome};
use crate::layout::{Interval, Placement, SectionLayout};
use crate::protocol::{Frame, InboundEvent};
use crate::registry::{RunRegistry, Selection};
use crate::trace::TraceTree;
use crate::types::{MessageId, RunId, Section, SectionId};

/// Everything scoped to one selected run.
#[derive(Debug)]
pub struct RunSession {
    pub run_id: RunId,
    pub epoch: u64,
    pub trace: TraceTree,
    pub layout: SectionLayout,
    sections: BTreeMap<SectionId, Section>,
}

impl RunSession {
    fn new(selection: Selection) -> Self {
        Self {
            run_id: selection.run_id,
            epoch: selection.epoch,
            trace: TraceTree::new(),
            layout: SectionLayout::new(),
            sections: BTreeMap::new(),
        }
    }

    fn apply_section(&mut self, section: Section) -> Placement {
        let placement = self.layout.place_section(&section);
        self.sections.insert(section.id, section);
        placement
    }

    fn apply_event(&mut self, event: InboundEvent) {
        match event {
            // Runs live in the registry.
            InboundEvent::Run(_) => {}
            InboundEvent::Section(section) => {
                let id = section.id;
                let placement = self.apply_section(section);
                tracing::trace!(
                    section_id = id,
                    column = placement.column,
                    position = placement.position,
                    "Placed section"
                );
            }
            InboundEvent::Message(message) => self.trace.apply_message(&message),
            InboundEvent::MessageStreamPart(part) => self.trace.apply_message_fragment(&part),
            InboundEvent::ToolCall(call) => self.trace.apply_tool_call(&call),
            InboundEvent::ToolCallStreamPart(part) => self.trace.apply_tool_call_fragment(&part),
        }
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(&id)
    }

    /// Sections by id.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    /// Sections spanning a message, with their column.
    pub fn sections_covering(&self, message_id: MessageId) -> Vec<(usize, &Section)> {
        self.layout
            .covering(message_id)
            .filter_map(|(column, id, _)| self.sections.get(&id).map(|s| (column, s)))
            .collect()
    }

    /// The interval of a section clipped to the messages received so far.
    ///
    /// `None` when the section does not touch any known message.
    pub fn visible_interval(&self, id: SectionId) -> Option<Interval> {
        let interval = self.layout.interval(id)?;
        let (first, last) = self.trace.bounds_within(interval.from, interval.to)?;
        Some(Interval::new(first, last.saturating_add(1)))
    }

    /// One lane per layout column, describing how the section in that column
    /// (if any) relates to `message_id`.
    pub fn lanes(&self, message_id: MessageId) -> Vec<Lane<'_>> {
        let mut lanes = vec![Lane::default(); self.layout.column_count()];
        for (column, id, interval) in self.layout.covering(message_id) {
            let (Some(section), Some((first, last))) = (
                self.sections.get(&id),
                self.trace.bounds_within(interval.from, interval.to),
            ) else {
                continue;
            };
            let mark = match (message_id == first, message_id == last) {
                (true, true) => LaneMark::Only,
                (true, false) => LaneMark::Start,
                (false, true) => LaneMark::End,
                (false, false) => LaneMark::Inside,
            };
            lanes[column] = Lane {
                mark,
                section: Some(section),
            };
        }
        lanes
    }
}

/// Position of a message relative to a section drawn in one lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaneMark {
    /// No section in this lane covers the message
    #[default]
    Empty,
    /// First visible message of the section
    Start,
    Inside,
    /// Last visible message of the section
    End,
    /// The section covers exactly this one visible message
    Only,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lane<'a> {
    pub mark: LaneMark,
    pub section: Option<&'a Section>,
}

#[derive(Debug)]
pub struct ViewerState {
    registry: RunRegistry,
    session: Option<RunSession>,
}

impl ViewerState {
    pub fn new(debounce: Duration) -> Self {
        Self {
            registry: RunRegistry::new(debounce),
            session: None,
        }
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn session(&self) -> Option<&RunSession> {
        self.session.as_ref()
    }

    pub fn follow(&self) -> bool {
        self.registry.follow()
    }

    pub fn set_follow(&mut self, follow: bool) {
        self.registry.set_follow(follow);
    }

    /// Apply one decoded frame.
    pub fn apply(&mut self, frame: Frame, now: Instant) -> Outcome {
        let kind = frame.event.kind();

        if let InboundEvent::Run(run) = frame.event {
            let run_id = run.id;
            self.registry.upsert_run(run, now);
            return Outcome::Applied { kind, run_id };
        }

        let Some(session) = self.session.as_mut() else {
            return Outcome::Ignored(IgnoreReason::NoSelection);
        };
        if frame.event.run_id().is_some_and(|id| id != session.run_id) {
            return Outcome::Ignored(IgnoreReason::StaleRun);
        }
        if frame.epoch.is_some_and(|epoch| epoch != session.epoch) {
            return Outcome::Ignored(IgnoreReason::StaleEpoch);
        }

        session.apply_event(frame.event);

        Outcome::Applied {
            kind,
            run_id: session.run_id,
        }
    }

    /// Request a debounced switch to `run_id`.
    pub fn select_run(&mut self, run_id: RunId, now: Instant) {
        self.registry.select_run(run_id, now);
    }

    /// Switch to `run_id` right away.
    pub fn select_now(&mut self, run_id: RunId) -> Option<Selection> {
        let selection = self.registry.select_now(run_id)?;
        self.begin(selection);
        Some(selection)
    }

    /// Advance timers. Returns a selection that executed.
    pub fn tick(&mut self, now: Instant) -> Option<Selection> {
        let selection = self.registry.poll_selection(now)?;
        self.begin(selection);
        Some(selection)
    }

    /// Called when the channel (re)opens. Returns the subscription to resend.
    pub fn on_connected(&mut self) -> Option<Selection> {
        let selection = self.registry.resubscribe()?;
        self.begin(selection);
        Some(selection)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.registry.next_deadline()
    }

    fn begin(&mut self, selection: Selection) {
        self.session = Some(RunSession::new(selection));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_frame;
    use crate::types::Message;

    const WAIT: Duration = Duration::from_millis(100);

    fn frame(text: &str) -> Frame {
        decode_frame(text).unwrap()
    }

    fn message(run_id: Option<RunId>, id: MessageId, content: &str) -> Frame {
        Frame {
            event: InboundEvent::Message(Message {
                id,
                run_id,
                conversation: None,
                role: Some("user".to_string()),
                content: content.to_string(),
                duration: 0.0,
                tokens_query: 0,
                tokens_response: 0,
            }),
            epoch: None,
        }
    }

    #[test]
    fn test_events_before_selection_are_ignored() {
        let mut state = ViewerState::new(WAIT);
        let outcome = state.apply(message(Some(1), 1, "hi"), Instant::now());
        assert_eq!(outcome, Outcome::Ignored(IgnoreReason::NoSelection));
    }

    #[test]
    fn test_events_for_other_run_are_stale() {
        let mut state = ViewerState::new(WAIT);
        state.select_now(1);
        let now = Instant::now();

        assert_eq!(
            state.apply(message(Some(2), 1, "late"), now),
            Outcome::Ignored(IgnoreReason::StaleRun)
        );
        assert!(matches!(
            state.apply(message(None, 1, "untagged"), now),
            Outcome::Applied { run_id: 1, .. }
        ));
    }

    #[test]
    fn test_old_epoch_is_stale() {
        let mut state = ViewerState::new(WAIT);
        state.select_now(1);
        state.select_now(2);
        let now = Instant::now();

        let old = frame(r#"{"type":"Message","epoch":1,"data":{"id":1,"run_id":2,"content":"x"}}"#);
        assert_eq!(state.apply(old, now), Outcome::Ignored(IgnoreReason::StaleEpoch));

        let fresh = frame(r#"{"type":"Message","epoch":2,"data":{"id":1,"run_id":2,"content":"x"}}"#);
        assert!(matches!(state.apply(fresh, now), Outcome::Applied { .. }));
    }

    #[test]
    fn test_switching_runs_discards_session() {
        let mut state = ViewerState::new(WAIT);
        let now = Instant::now();
        state.select_now(1);
        state.apply(message(Some(1), 1, "first run"), now);
        state.apply(
            frame(r#"{"type":"Section","data":{"id":1,"run_id":1,"name":"s","duration":0,"from_message":1,"to_message":null}}"#),
            now,
        );

        state.select_run(2, now);
        let selection = state.tick(now + WAIT).unwrap();

        assert_eq!(selection, Selection { run_id: 2, epoch: 2 });
        let session = state.session().unwrap();
        assert_eq!(session.run_id, 2);
        assert!(session.trace.is_empty());
        assert_eq!(session.layout.column_count(), 0);
        assert_eq!(session.sections().count(), 0);
    }

    #[test]
    fn test_reconnect_resubscribes_with_clean_session() {
        let mut state = ViewerState::new(WAIT);
        let now = Instant::now();
        assert_eq!(state.on_connected(), None);

        state.select_now(5);
        state.apply(message(Some(5), 1, "before drop"), now);

        let selection = state.on_connected().unwrap();
        assert_eq!(selection, Selection { run_id: 5, epoch: 2 });
        assert!(state.session().unwrap().trace.is_empty());
    }

    #[test]
    fn test_run_events_apply_without_selection() {
        let mut state = ViewerState::new(WAIT);
        let outcome = state.apply(
            frame(r#"{"type":"Run","epoch":99,"data":{"id":8,"model":"m","tag":"","started_at":"t","state":"in progress","configuration":"{}"}}"#),
            Instant::now(),
        );
        assert_eq!(
            outcome,
            Outcome::Applied {
                kind: crate::protocol::EventKind::Run,
                run_id: 8
            }
        );
        assert!(state.registry().get(8).is_some());
    }

    #[test]
    fn test_visible_interval_is_clipped_to_known_messages() {
        let mut state = ViewerState::new(WAIT);
        let now = Instant::now();
        state.select_now(1);
        for id in 3..=6 {
            state.apply(message(Some(1), id, "m"), now);
        }
        state.apply(
            frame(r#"{"type":"Section","data":{"id":1,"name":"open","duration":0,"from_message":5}}"#),
            now,
        );
        state.apply(
            frame(r#"{"type":"Section","data":{"id":2,"name":"future","duration":0,"from_message":10,"to_message":12}}"#),
            now,
        );

        let session = state.session().unwrap();
        assert_eq!(session.visible_interval(1), Some(Interval::new(5, 7)));
        assert_eq!(session.visible_interval(2), None);
        assert_eq!(session.sections_covering(6).len(), 1);

        let marks = |id| -> Vec<LaneMark> { session.lanes(id).iter().map(|l| l.mark).collect() };
        assert_eq!(marks(3), vec![LaneMark::Empty, LaneMark::Empty]);
        assert_eq!(marks(5), vec![LaneMark::Start, LaneMark::Empty]);
        assert_eq!(marks(6), vec![LaneMark::End, LaneMark::Empty]);
    }
}
