use super::{Enumeration, NodeEnumeration};
use crate::context::LastPositionFinder;
use crate::error::Result;
use std::cell::RefCell;
use std::collections::VecDeque;

struct LookaheadState<'e, N> {
    base: Enumeration<'e, N>,
    reservoir: VecDeque<N>,
    delivered: usize,
    last: Option<usize>,
}

/// Passes nodes straight through until someone asks for the last position, then buffers the
/// remainder of the base so the count is known. The drain happens at most once.
pub struct LookaheadEnumeration<'e, N> {
    state: RefCell<LookaheadState<'e, N>>,
    sorted: bool,
    reverse_sorted: bool,
    peer: bool,
}

impl<'e, N> LookaheadEnumeration<'e, N> {
    pub fn new(base: Enumeration<'e, N>) -> Self {
        let sorted = base.is_document_sorted();
        let reverse_sorted = base.is_reverse_sorted();
        let peer = base.is_peer();
        Self {
            state: RefCell::new(LookaheadState {
                base,
                reservoir: VecDeque::new(),
                delivered: 0,
                last: None,
            }),
            sorted,
            reverse_sorted,
            peer,
        }
    }
}

impl<N> Iterator for LookaheadEnumeration<'_, N> {
    type Item = Result<N>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.state.get_mut();
        let next = match state.reservoir.pop_front() {
            Some(node) => Some(Ok(node)),
            None => state.base.next(),
        };
        if let Some(Ok(_)) = next {
            state.delivered += 1;
        }
        next
    }
}

impl<N> LastPositionFinder for LookaheadEnumeration<'_, N> {
    fn last_position(&self) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        if let Some(last) = state.last {
            return Ok(last);
        }
        let mut buffered = Vec::new();
        for node in state.base.by_ref() {
            buffered.push(node?);
        }
        log::trace!("lookahead buffered {} nodes to find last()", buffered.len());
        state.reservoir.extend(buffered);
        let last = state.delivered + state.reservoir.len();
        state.last = Some(last);
        Ok(last)
    }
}

impl<N> NodeEnumeration<N> for LookaheadEnumeration<'_, N> {
    fn is_document_sorted(&self) -> bool {
        self.sorted
    }

    fn is_reverse_sorted(&self) -> bool {
        self.reverse_sorted
    }

    fn is_peer(&self) -> bool {
        self.peer
    }

    fn last_position_finder(&self) -> Option<&dyn LastPositionFinder> {
        Some(self)
    }
}
