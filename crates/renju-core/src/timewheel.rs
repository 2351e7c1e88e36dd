//! Hashed time wheel for deferred bookkeeping.
//!
//! Carries typed single-shot tasks; re-arming is explicit. The wheel does
//! not own a clock or a thread; the driver calls [`TimeWheel::tick`] once
//! per tick interval and executes whatever falls due. Tasks may fire up to
//! one tick late; precision is not a goal, session-expiry checks are the
//! only customer.

/// A slotted wheel of single-shot tasks.
///
/// Delays longer than one revolution are carried by a per-entry round
/// counter that decrements each time the slot comes around.
#[derive(Debug)]
pub struct TimeWheel<T> {
    slots: Vec<Vec<Entry<T>>>,
    current: usize,
}

#[derive(Debug)]
struct Entry<T> {
    rounds: usize,
    task: T,
}

impl<T> TimeWheel<T> {
    /// Default slot count, one revolution per minute at a 1 s tick.
    pub const DEFAULT_SLOTS: usize = 60;

    /// Create a wheel with `slots` slots.
    ///
    /// # Panics
    ///
    /// Panics if `slots` is zero.
    #[must_use]
    pub fn new(slots: usize) -> Self {
        assert!(slots > 0, "time wheel needs at least one slot");
        Self { slots: (0..slots).map(|_| Vec::new()).collect(), current: 0 }
    }

    /// Schedule a task to fire after `delay_ticks` ticks.
    ///
    /// A zero delay fires on the next tick.
    pub fn schedule(&mut self, delay_ticks: usize, task: T) {
        let delay = delay_ticks.max(1);
        let slot = (self.current + delay) % self.slots.len();
        let rounds = (delay - 1) / self.slots.len();
        self.slots[slot].push(Entry { rounds, task });
    }

    /// Advance one tick and return the tasks that fall due.
    pub fn tick(&mut self) -> Vec<T> {
        self.current = (self.current + 1) % self.slots.len();

        let slot = &mut self.slots[self.current];
        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(slot.len());

        for mut entry in slot.drain(..) {
            if entry.rounds == 0 {
                due.push(entry.task);
            } else {
                entry.rounds -= 1;
                remaining.push(entry);
            }
        }

        *slot = remaining;
        due
    }

    /// Total tasks currently scheduled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    /// True when nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_fires_after_delay() {
        let mut wheel = TimeWheel::new(8);
        wheel.schedule(3, "expiry");

        assert!(wheel.tick().is_empty());
        assert!(wheel.tick().is_empty());
        assert_eq!(wheel.tick(), vec!["expiry"]);
        assert!(wheel.is_empty());
    }

    #[test]
    fn zero_delay_fires_next_tick() {
        let mut wheel = TimeWheel::new(8);
        wheel.schedule(0, 1u32);
        assert_eq!(wheel.tick(), vec![1]);
    }

    #[test]
    fn delay_longer_than_one_revolution() {
        let mut wheel = TimeWheel::new(4);
        wheel.schedule(10, "late");

        for _ in 0..9 {
            assert!(wheel.tick().is_empty());
        }
        assert_eq!(wheel.tick(), vec!["late"]);
    }

    #[test]
    fn tasks_in_same_slot_fire_together() {
        let mut wheel = TimeWheel::new(4);
        wheel.schedule(2, 1u32);
        wheel.schedule(2, 2u32);
        wheel.schedule(6, 3u32); // same slot, one round later

        assert!(wheel.tick().is_empty());
        assert_eq!(wheel.tick(), vec![1, 2]);

        for _ in 0..3 {
            assert!(wheel.tick().is_empty());
        }
        assert_eq!(wheel.tick(), vec![3]);
    }

    #[test]
    fn tasks_are_single_shot() {
        let mut wheel = TimeWheel::new(4);
        wheel.schedule(1, ());
        assert_eq!(wheel.tick().len(), 1);

        for _ in 0..8 {
            assert!(wheel.tick().is_empty());
        }
    }

    #[test]
    fn explicit_rearm_fires_again() {
        let mut wheel = TimeWheel::new(4);
        wheel.schedule(1, 7u32);
        assert_eq!(wheel.tick(), vec![7]);

        wheel.schedule(2, 7u32);
        assert!(wheel.tick().is_empty());
        assert_eq!(wheel.tick(), vec![7]);
    }
}
