//! Decode-once cell with cached failure.
//!
//! Some parts are expensive to decode (the mashup container is scanned in
//! full and its nested archives are indexed), so the result is computed on
//! first access and shared afterwards. A failed decode is cached too: later
//! callers get the same error without running the decoder again.

use crate::common::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;

/// State of a lazily decoded value.
#[derive(Debug)]
pub enum DecodeState<T> {
    /// The decoder has not run yet
    NotDecoded,
    /// The decoder ran and produced a value
    Decoded(Rc<T>),
    /// The decoder ran and failed
    Failed(Error),
}

/// Single-threaded memoizing cell.
///
/// No locking is provided; the cell is `!Sync` through its `RefCell`.
#[derive(Debug)]
pub struct Memo<T> {
    state: RefCell<DecodeState<T>>,
}

impl<T> Memo<T> {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(DecodeState::NotDecoded),
        }
    }

    /// Return the cached value or failure, running `decode` on first access.
    ///
    /// `decode` must not access this cell.
    pub fn get_or_decode<F>(&self, decode: F) -> Result<Rc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        match &*self.state.borrow() {
            DecodeState::Decoded(value) => return Ok(Rc::clone(value)),
            DecodeState::Failed(err) => return Err(err.clone()),
            DecodeState::NotDecoded => {},
        }

        let (next, result) = match decode() {
            Ok(value) => {
                let value = Rc::new(value);
                (DecodeState::Decoded(Rc::clone(&value)), Ok(value))
            },
            Err(err) => (DecodeState::Failed(err.clone()), Err(err)),
        };
        *self.state.borrow_mut() = next;
        result
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}
