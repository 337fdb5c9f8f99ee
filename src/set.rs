//! Several Trellis boards tiled into one logical keypad.
//!
//! Board `k` in the set owns the global indices `16k..16k+16`. Every operation comes
//! in two forms: the plain form works on the whole set and takes global indices, the
//! `_for` form works on an explicit list of boards and passes the index through as a
//! board-local one.

use crate::error::Error;
use crate::trellis::{SharedTrellis, Trellis, KEYS_PER_BOARD};
use embedded_hal::i2c::{ErrorType, I2c};
use log::{debug, warn};
use std::rc::Rc;

/// Trellis address jumpers give eight distinct addresses per bus.
pub const MAX_BOARDS: usize = 8;

type BoardResult<T, I2C> = Result<T, Error<<I2C as ErrorType>::Error>>;

pub struct TrellisSet<I2C> {
    boards: Vec<SharedTrellis<I2C>>,
}

impl<I2C: I2c> TrellisSet<I2C> {
    /// Build a set from 1 to 8 boards. A board passed more than once is only added
    /// the first time.
    pub fn new<B>(boards: B) -> BoardResult<Self, I2C>
    where
        B: IntoIterator<Item = SharedTrellis<I2C>>,
    {
        let given: Vec<_> = boards.into_iter().collect();
        if given.is_empty() {
            return Err(Error::EmptySet);
        }
        if given.len() > MAX_BOARDS {
            return Err(Error::TooManyBoards { count: given.len() });
        }

        let mut unique: Vec<SharedTrellis<I2C>> = Vec::with_capacity(given.len());
        for (position, board) in given.into_iter().enumerate() {
            if unique.iter().any(|b| Rc::ptr_eq(b, &board)) {
                warn!("Board {} in the list is already in the set, skipping", position);
                continue;
            }
            unique.push(board);
        }

        debug!("Trellis set with {} board(s)", unique.len());
        Ok(TrellisSet { boards: unique })
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Number of global LED/button indices.
    pub fn led_count(&self) -> usize {
        self.boards.len() * KEYS_PER_BOARD
    }

    pub fn boards(&self) -> &[SharedTrellis<I2C>] {
        &self.boards
    }

    /// The board owning global `index` and the index local to that board.
    pub fn resolve(&self, index: usize) -> Option<(&SharedTrellis<I2C>, u8)> {
        self.boards
            .get(index / KEYS_PER_BOARD)
            .map(|board| (board, (index % KEYS_PER_BOARD) as u8))
    }

    /// Returns false, without touching any board, if `index` is past the last board.
    pub fn set_led(&self, index: usize, on: bool) -> BoardResult<bool, I2C> {
        match self.resolve(index) {
            Some((board, local)) => {
                board.borrow_mut().set_led(local, on)?;
                Ok(true)
            }
            None => {
                debug!("LED {} is not on any of {} board(s)", index, self.len());
                Ok(false)
            }
        }
    }

    pub fn led_on(&self, index: usize) -> BoardResult<bool, I2C> {
        self.set_led(index, true)
    }

    pub fn led_off(&self, index: usize) -> BoardResult<bool, I2C> {
        self.set_led(index, false)
    }

    pub fn set_led_for(
        &self,
        boards: &[SharedTrellis<I2C>],
        index: u8,
        on: bool,
    ) -> BoardResult<(), I2C> {
        for_each(boards, |trellis| trellis.set_led(index, on))
    }

    pub fn led_on_for(&self, boards: &[SharedTrellis<I2C>], index: u8) -> BoardResult<(), I2C> {
        self.set_led_for(boards, index, true)
    }

    pub fn led_off_for(&self, boards: &[SharedTrellis<I2C>], index: u8) -> BoardResult<(), I2C> {
        self.set_led_for(boards, index, false)
    }

    /// `None` if `index` is past the last board.
    pub fn led_state(&self, index: usize) -> BoardResult<Option<bool>, I2C> {
        self.query(index, Trellis::led_state)
    }

    pub fn led_state_for(
        &self,
        boards: &[SharedTrellis<I2C>],
        index: u8,
    ) -> BoardResult<Option<bool>, I2C> {
        query_for(boards, index, Trellis::led_state)
    }

    pub fn fill(&self, on: bool) {
        self.fill_for(&self.boards, on);
    }

    pub fn fill_for(&self, boards: &[SharedTrellis<I2C>], on: bool) {
        for board in boards {
            board.borrow_mut().fill(on);
        }
    }

    pub fn show(&self) -> BoardResult<(), I2C> {
        self.show_for(&self.boards)
    }

    pub fn show_for(&self, boards: &[SharedTrellis<I2C>]) -> BoardResult<(), I2C> {
        for_each(boards, Trellis::show)
    }

    pub fn set_brightness(&self, level: u8) -> BoardResult<(), I2C> {
        self.set_brightness_for(&self.boards, level)
    }

    pub fn set_brightness_for(
        &self,
        boards: &[SharedTrellis<I2C>],
        level: u8,
    ) -> BoardResult<(), I2C> {
        for_each(boards, |trellis| trellis.set_brightness(level))
    }

    pub fn set_blink_rate(&self, rate: u8) -> BoardResult<(), I2C> {
        self.set_blink_rate_for(&self.boards, rate)
    }

    pub fn set_blink_rate_for(
        &self,
        boards: &[SharedTrellis<I2C>],
        rate: u8,
    ) -> BoardResult<(), I2C> {
        for_each(boards, |trellis| trellis.set_blink_rate(rate))
    }

    /// Scan every board. True if a key changed on any of them.
    pub fn scan_buttons(&self) -> BoardResult<bool, I2C> {
        self.scan_buttons_for(&self.boards)
    }

    pub fn scan_buttons_for(&self, boards: &[SharedTrellis<I2C>]) -> BoardResult<bool, I2C> {
        let mut changed = false;
        for board in boards {
            // every board must be scanned to keep its edge state current
            changed |= board.borrow_mut().scan_buttons()?;
        }
        Ok(changed)
    }

    pub fn just_pressed(&self, button: usize) -> BoardResult<Option<bool>, I2C> {
        self.query(button, Trellis::just_pressed)
    }

    /// Fails with `AmbiguousTarget` if more than one board is given.
    pub fn just_pressed_for(
        &self,
        boards: &[SharedTrellis<I2C>],
        button: u8,
    ) -> BoardResult<Option<bool>, I2C> {
        query_for(boards, button, Trellis::just_pressed)
    }

    pub fn just_released(&self, button: usize) -> BoardResult<Option<bool>, I2C> {
        self.query(button, Trellis::just_released)
    }

    /// Fails with `AmbiguousTarget` if more than one board is given.
    pub fn just_released_for(
        &self,
        boards: &[SharedTrellis<I2C>],
        button: u8,
    ) -> BoardResult<Option<bool>, I2C> {
        query_for(boards, button, Trellis::just_released)
    }

    fn query<F>(&self, index: usize, f: F) -> BoardResult<Option<bool>, I2C>
    where
        F: Fn(&Trellis<I2C>, u8) -> BoardResult<bool, I2C>,
    {
        self.resolve(index)
            .map(|(board, local)| f(&*board.borrow(), local))
            .transpose()
    }
}

fn for_each<I2C, F>(boards: &[SharedTrellis<I2C>], mut f: F) -> BoardResult<(), I2C>
where
    I2C: I2c,
    F: FnMut(&mut Trellis<I2C>) -> BoardResult<(), I2C>,
{
    for board in boards {
        f(&mut *board.borrow_mut())?;
    }
    Ok(())
}

fn query_for<I2C, F>(boards: &[SharedTrellis<I2C>], index: u8, f: F) -> BoardResult<Option<bool>, I2C>
where
    I2C: I2c,
    F: Fn(&Trellis<I2C>, u8) -> BoardResult<bool, I2C>,
{
    match boards {
        [] => Ok(None),
        [board] => f(&*board.borrow(), index).map(Some),
        _ => Err(Error::AmbiguousTarget),
    }
}
