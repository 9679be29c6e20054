//! The Watch multiplexer: merges several [`Watch`]es into one lazy
//! sequence, advancing each by exactly one read-cycle per round, the
//! synchronous analogue of the teacher's `kube_runtime::utils` stream
//! combinators (`StreamExt::merge` and friends), adapted from
//! `futures`-style polling to a round-robin blocking `Iterator`.
use crate::error::Result;
use crate::watch::{Event, StepOutcome, Watch};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// A set of watches consumed as one merged lazy sequence.
pub struct WatchCollection {
    watches: Vec<Rc<RefCell<Watch>>>,
    stop_flag: Rc<Cell<bool>>,
}

impl Default for WatchCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchCollection {
    /// An empty collection; add watches with [`WatchCollection::push`].
    pub fn new() -> Self {
        WatchCollection { watches: Vec::new(), stop_flag: Rc::new(Cell::new(false)) }
    }

    /// Adds a watch to the round-robin. Order determines round-robin order,
    /// not delivery priority.
    pub fn push(&mut self, watch: Rc<RefCell<Watch>>) {
        self.watches.push(watch);
    }

    /// Requests a stop on the collection and propagates it to every member watch.
    pub fn stop(&self) {
        self.stop_flag.set(true);
        for watch in &self.watches {
            watch.borrow().stop();
        }
    }

    /// A lazy sequence merging every member watch, round-robin, one
    /// read-cycle per member per round.
    pub fn stream(&self) -> CollectionIter<'_> {
        CollectionIter {
            watches: &self.watches,
            stop_flag: Rc::clone(&self.stop_flag),
            idx: 0,
            pending: VecDeque::new(),
            live: vec![true; self.watches.len()],
        }
    }
}

/// Lazy iterator produced by [`WatchCollection::stream`].
pub struct CollectionIter<'a> {
    watches: &'a [Rc<RefCell<Watch>>],
    stop_flag: Rc<Cell<bool>>,
    idx: usize,
    pending: VecDeque<Event>,
    live: Vec<bool>,
}

impl Iterator for CollectionIter<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.watches.is_empty() {
            return None;
        }
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.stop_flag.get() || self.live.iter().all(|alive| !alive) {
                return None;
            }
            // Find the next live watch, round-robin from where we left off.
            let mut advanced = false;
            for _ in 0..self.watches.len() {
                let i = self.idx;
                self.idx = (self.idx + 1) % self.watches.len();
                if !self.live[i] {
                    continue;
                }
                advanced = true;
                match self.watches[i].borrow_mut().step() {
                    Ok(StepOutcome::Terminated) => {
                        self.live[i] = false;
                        continue;
                    }
                    Ok(StepOutcome::Events(events)) => {
                        if events.is_empty() {
                            continue;
                        }
                        self.pending.extend(events);
                        break;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }
            if !advanced {
                return None;
            }
        }
    }
}
