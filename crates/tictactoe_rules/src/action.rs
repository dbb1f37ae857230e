//! Move legality, move application and turn ownership.
//!
//! Moves are validated independently of execution so a client can
//! guard an action before it reaches any shared state.

use crate::rules::winner;
use crate::{BOARD_SIZE, Board, Mark};
use tracing::{debug, instrument};

/// Error returned by [`apply_move`] when the move is not legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum IllegalMoveError {
    /// The index does not name a square.
    #[display("Square index {} is out of bounds (must be 0-8)", _0)]
    OutOfBounds(#[error(not(source))] usize),

    /// The square is already taken.
    #[display("Square {} is already occupied", _0)]
    SquareOccupied(#[error(not(source))] usize),

    /// A line is already complete; no further moves are accepted.
    #[display("Game is already won by {}", _0)]
    GameOver(#[error(not(source))] Mark),
}

/// Checks a move without applying it.
fn check_move(board: &Board, index: usize) -> Result<(), IllegalMoveError> {
    if index >= BOARD_SIZE {
        return Err(IllegalMoveError::OutOfBounds(index));
    }
    if !board.is_empty(index) {
        return Err(IllegalMoveError::SquareOccupied(index));
    }
    if let Some(mark) = winner(board) {
        return Err(IllegalMoveError::GameOver(mark));
    }
    Ok(())
}

/// True iff `index` is on the board, its square is empty and nobody has won.
#[instrument(skip(board))]
pub fn is_legal_move(board: &Board, index: usize) -> bool {
    check_move(board, index).is_ok()
}

/// Returns a new board with `mark` placed at `index`.
///
/// The input board is never modified.
///
/// # Errors
///
/// Returns [`IllegalMoveError`] when [`is_legal_move`] is false.
#[instrument(skip(board))]
pub fn apply_move(board: &Board, index: usize, mark: Mark) -> Result<Board, IllegalMoveError> {
    check_move(board, index).inspect_err(|e| debug!(error = %e, "Rejected move"))?;
    Ok(board.with_mark(index, mark))
}

/// Whether `user` owns the current turn.
///
/// The creator plays X and the opponent plays O, so `user` may move iff
/// they are the creator and X is to move, or the opponent and O is to move.
pub fn can_move<U: PartialEq + ?Sized>(
    creator: &U,
    opponent: Option<&U>,
    turn_owner: Mark,
    user: &U,
) -> bool {
    match turn_owner {
        Mark::X => creator == user,
        Mark::O => opponent.is_some_and(|o| o == user),
    }
}

/// The mark `user` plays in a game, if they take part in it.
pub fn mark_for<U: PartialEq + ?Sized>(creator: &U, opponent: Option<&U>, user: &U) -> Option<Mark> {
    if creator == user {
        Some(Mark::X)
    } else if opponent.is_some_and(|o| o == user) {
        Some(Mark::O)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Square;

    #[test]
    fn test_apply_move_leaves_input_untouched() {
        let board = Board::new();
        let next = apply_move(&board, 4, Mark::X).expect("legal move");
        assert!(board.is_blank());
        assert_eq!(next.get(4), Some(Square::Occupied(Mark::X)));
        assert_eq!(next.count(Mark::X), 1);
    }

    #[test]
    fn test_occupied_square_rejected() {
        let board = apply_move(&Board::new(), 4, Mark::X).expect("legal move");
        assert!(!is_legal_move(&board, 4));
        assert_eq!(
            apply_move(&board, 4, Mark::O),
            Err(IllegalMoveError::SquareOccupied(4))
        );
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        assert!(!is_legal_move(&Board::new(), 9));
        assert_eq!(
            apply_move(&Board::new(), 42, Mark::X),
            Err(IllegalMoveError::OutOfBounds(42))
        );
    }

    #[test]
    fn test_no_moves_after_win_even_on_empty_square() {
        let mut board = Board::new();
        for (index, mark) in [(0, Mark::X), (3, Mark::O), (1, Mark::X), (4, Mark::O), (2, Mark::X)] {
            board = apply_move(&board, index, mark).expect("legal move");
        }
        assert!(board.is_empty(8));
        assert!(!is_legal_move(&board, 8));
        assert_eq!(
            apply_move(&board, 8, Mark::O),
            Err(IllegalMoveError::GameOver(Mark::X))
        );
    }

    #[test]
    fn test_can_move_follows_turn_owner() {
        assert!(can_move("alice", Some("bob"), Mark::X, "alice"));
        assert!(!can_move("alice", Some("bob"), Mark::X, "bob"));
        assert!(can_move("alice", Some("bob"), Mark::O, "bob"));
        assert!(!can_move("alice", Some("bob"), Mark::O, "alice"));
        assert!(!can_move("alice", None, Mark::O, "bob"));
        assert!(!can_move("alice", Some("bob"), Mark::X, "carol"));
    }

    #[test]
    fn test_mark_for_participants() {
        assert_eq!(mark_for("alice", Some("bob"), "alice"), Some(Mark::X));
        assert_eq!(mark_for("alice", Some("bob"), "bob"), Some(Mark::O));
        assert_eq!(mark_for("alice", None, "bob"), None);
    }
}
