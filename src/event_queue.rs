//! Beat-time ordered queue of pending note events.

use heapless::Vec;

use crate::config::EVENT_CAPACITY;
use crate::event::Event;

/// Fixed-capacity queue of events sorted by beat time.
///
/// Events are consumed through a cursor so the render path never shifts
/// memory. In linear mode fired events are compacted away on the next
/// insertion; in loop mode they stay and fire again after `rewind`.
#[derive(Debug, Clone)]
pub struct EventQueue {
    events: Vec<Event, EVENT_CAPACITY>,
    /// Next event index to fire.
    cursor: usize,
    /// Position of the last `pop_due` or `seek` in the current cycle.
    playhead: f64,
    looping: bool,
}

impl EventQueue {
    pub fn new(looping: bool) -> Self {
        Self {
            events: Vec::new(),
            cursor: 0,
            playhead: f64::NEG_INFINITY,
            looping,
        }
    }

    /// Insert an event after every event with the same or earlier beat time.
    ///
    /// In loop mode an event behind the playhead waits for the next cycle;
    /// in linear mode it fires on the next `pop_due`. Returns the event back
    /// if the queue is full.
    pub fn push(&mut self, event: Event) -> Result<(), Event> {
        if !self.looping {
            self.compact();
        }

        let pos = self
            .events
            .partition_point(|e| e.beat_time <= event.beat_time);
        self.events.insert(pos, event)?;

        let behind = self.looping && (event.beat_time as f64) < self.playhead;
        if behind || pos < self.cursor {
            self.cursor += 1;
        }
        Ok(())
    }

    /// Drop every event, fired or not.
    pub fn clear(&mut self) {
        self.events.clear();
        self.cursor = 0;
    }

    /// Move the cursor to the first event at or after `position`.
    ///
    /// In linear mode events that already fired are gone for good, so a
    /// backwards seek never replays them.
    pub fn seek(&mut self, position: f64) {
        if !self.looping {
            self.compact();
        }
        self.cursor = self
            .events
            .partition_point(|e| (e.beat_time as f64) < position);
        self.playhead = position;
    }

    /// Restart from the first event (loop wrap).
    #[inline]
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.playhead = f64::NEG_INFINITY;
    }

    /// Next event whose beat time has been reached, if any.
    #[inline]
    pub fn pop_due(&mut self, position: f64) -> Option<Event> {
        self.playhead = position;
        let event = *self.events.get(self.cursor)?;
        if (event.beat_time as f64) <= position {
            self.cursor += 1;
            Some(event)
        } else {
            None
        }
    }

    /// Events that have not fired yet (in this cycle, when looping).
    pub fn pending(&self) -> usize {
        self.events.len() - self.cursor
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Remove fired events from the front.
    fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let fired = self.cursor;
        let remaining = self.events.len() - fired;
        self.events.rotate_left(fired);
        self.events.truncate(remaining);
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(beat_time: f32, pitch: i8) -> Event {
        Event::new(beat_time, pitch, 100, 1.0, 0)
    }

    fn drain(queue: &mut EventQueue, position: f64) -> std::vec::Vec<(f32, i8)> {
        let mut out = std::vec::Vec::new();
        while let Some(e) = queue.pop_due(position) {
            out.push((e.beat_time, e.pitch));
        }
        out
    }

    #[test]
    fn test_orders_by_beat_time() {
        let mut queue = EventQueue::new(false);
        queue.push(event(2.0, 62)).unwrap();
        queue.push(event(0.5, 60)).unwrap();
        queue.push(event(1.0, 61)).unwrap();

        assert_eq!(
            drain(&mut queue, 10.0),
            vec![(0.5, 60), (1.0, 61), (2.0, 62)]
        );
    }

    #[test]
    fn test_ties_are_fifo() {
        let mut queue = EventQueue::new(false);
        queue.push(event(1.0, 70)).unwrap();
        queue.push(event(0.0, 50)).unwrap();
        queue.push(event(1.0, 71)).unwrap();
        queue.push(event(1.0, 72)).unwrap();

        assert_eq!(
            drain(&mut queue, 1.0),
            vec![(0.0, 50), (1.0, 70), (1.0, 71), (1.0, 72)]
        );
    }

    #[test]
    fn test_only_due_events_fire() {
        let mut queue = EventQueue::new(false);
        queue.push(event(0.0, 60)).unwrap();
        queue.push(event(1.0, 61)).unwrap();

        assert_eq!(drain(&mut queue, 0.5), vec![(0.0, 60)]);
        assert_eq!(queue.pending(), 1);
        assert_eq!(drain(&mut queue, 1.0), vec![(1.0, 61)]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_linear_mode_compacts_fired_events() {
        let mut queue = EventQueue::new(false);
        queue.push(event(0.0, 60)).unwrap();
        queue.push(event(1.0, 61)).unwrap();
        drain(&mut queue, 0.0);
        assert_eq!(queue.len(), 2);

        queue.push(event(3.0, 63)).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(drain(&mut queue, 5.0), vec![(1.0, 61), (3.0, 63)]);
    }

    #[test]
    fn test_loop_mode_retains_and_rewinds() {
        let mut queue = EventQueue::new(true);
        queue.push(event(0.0, 60)).unwrap();
        queue.push(event(2.0, 62)).unwrap();

        assert_eq!(drain(&mut queue, 3.0).len(), 2);
        queue.rewind();
        assert_eq!(drain(&mut queue, 3.0).len(), 2);
    }

    #[test]
    fn test_loop_mode_past_insert_waits_for_next_cycle() {
        let mut queue = EventQueue::new(true);
        queue.push(event(0.0, 60)).unwrap();
        queue.push(event(2.0, 62)).unwrap();
        assert_eq!(drain(&mut queue, 1.0), vec![(0.0, 60)]);

        queue.push(event(0.5, 61)).unwrap();
        assert!(drain(&mut queue, 1.5).is_empty());

        queue.rewind();
        assert_eq!(drain(&mut queue, 1.0), vec![(0.0, 60), (0.5, 61)]);
    }

    #[test]
    fn test_loop_mode_insert_right_after_fired_event_waits() {
        let mut queue = EventQueue::new(true);
        queue.push(event(0.0, 60)).unwrap();
        assert_eq!(drain(&mut queue, 1.0), vec![(0.0, 60)]);

        // Sorts at the cursor, behind the playhead.
        queue.push(event(0.5, 61)).unwrap();
        assert_eq!(queue.pending(), 0);
        assert!(drain(&mut queue, 1.5).is_empty());

        queue.rewind();
        assert_eq!(drain(&mut queue, 0.5), vec![(0.0, 60), (0.5, 61)]);
    }

    #[test]
    fn test_loop_mode_insert_ahead_of_playhead_fires_this_cycle() {
        let mut queue = EventQueue::new(true);
        queue.push(event(0.0, 60)).unwrap();
        drain(&mut queue, 1.0);

        queue.push(event(1.5, 61)).unwrap();
        assert_eq!(drain(&mut queue, 2.0), vec![(1.5, 61)]);
    }

    #[test]
    fn test_linear_mode_late_insert_fires_next() {
        let mut queue = EventQueue::new(false);
        queue.push(event(0.0, 60)).unwrap();
        drain(&mut queue, 1.0);

        queue.push(event(0.5, 61)).unwrap();
        assert_eq!(drain(&mut queue, 1.1), vec![(0.5, 61)]);
    }

    #[test]
    fn test_seek_skips_earlier_events() {
        let mut queue = EventQueue::new(false);
        for i in 0..4 {
            queue.push(event(i as f32, 60 + i as i8)).unwrap();
        }
        queue.seek(2.0);
        assert_eq!(drain(&mut queue, 10.0), vec![(2.0, 62), (3.0, 63)]);
    }

    #[test]
    fn test_linear_seek_backwards_does_not_replay() {
        let mut queue = EventQueue::new(false);
        queue.push(event(0.0, 60)).unwrap();
        queue.push(event(2.0, 62)).unwrap();
        assert_eq!(drain(&mut queue, 1.0), vec![(0.0, 60)]);

        queue.seek(0.0);
        assert_eq!(drain(&mut queue, 10.0), vec![(2.0, 62)]);
    }

    #[test]
    fn test_loop_seek_lands_inside_cycle() {
        let mut queue = EventQueue::new(true);
        for i in 0..4 {
            queue.push(event(i as f32, 60 + i as i8)).unwrap();
        }
        drain(&mut queue, 10.0);
        queue.seek(1.5);
        assert_eq!(drain(&mut queue, 10.0), vec![(2.0, 62), (3.0, 63)]);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut queue = EventQueue::new(false);
        queue.push(event(0.0, 60)).unwrap();
        queue.push(event(1.0, 61)).unwrap();
        queue.clear();
        assert_eq!(queue.len(), 0);
        assert!(drain(&mut queue, 10.0).is_empty());
    }

    #[test]
    fn test_full_queue_returns_event() {
        let mut queue = EventQueue::new(true);
        for i in 0..EVENT_CAPACITY {
            queue.push(event(i as f32, 60)).unwrap();
        }
        let extra = event(0.0, 61);
        assert_eq!(queue.push(extra), Err(extra));
        assert_eq!(queue.len(), EVENT_CAPACITY);
    }
}
