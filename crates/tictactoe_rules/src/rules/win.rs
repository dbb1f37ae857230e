//! Win detection logic for tic-tac-toe.

use crate::{Board, Mark, Square};
use tracing::instrument;

/// The eight winning lines in canonical scan order: rows, columns, diagonals.
pub const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Returns the mark owning line `[a, b, c]`, if all three squares hold it.
pub(crate) fn line_owner(board: &Board, [a, b, c]: [usize; 3]) -> Option<Mark> {
    let sq = board.get(a)?;
    if sq != Square::Empty && Some(sq) == board.get(b) && Some(sq) == board.get(c) {
        sq.mark()
    } else {
        None
    }
}

/// Checks if there is a winner on the board.
///
/// Returns the mark of the first completed line in [`LINES`] order.
/// Boards that cannot arise in play (several completed lines, even for
/// both marks) still get a deterministic answer.
#[instrument(skip(board))]
pub fn winner(board: &Board) -> Option<Mark> {
    LINES.into_iter().find_map(|line| line_owner(board, line))
}
