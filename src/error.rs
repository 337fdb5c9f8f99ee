/// Errors raised by the board driver and the board set.
///
/// `E` is the error type of the underlying I2C bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error<E> {
    #[error("LED/button index {index} is outside 0-15")]
    OutOfRange { index: u8 },
    #[error("a board set needs at least one board")]
    EmptySet,
    #[error("a board set holds at most 8 boards, got {count}")]
    TooManyBoards { count: usize },
    #[error("only one board can be queried at a time")]
    AmbiguousTarget,
    #[error("I2C transaction failed: {0:?}")]
    Transport(E),
}
