//! First-class board invariants.
//!
//! Invariants are logical properties every board reachable through legal
//! play satisfies. Boards arriving from other clients are not validated by
//! anyone else, so readers check them here.

use crate::rules::{LINES, line_owner};
use crate::{Board, Mark, Square};
use tracing::instrument;

/// A logical property that must hold for a given state.
pub trait Invariant<S> {
    /// Checks if the invariant holds for the given state.
    fn holds(state: &S) -> bool;

    /// Human-readable description of the invariant.
    fn description() -> &'static str;
}

/// Violation of an invariant.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display("{}", description)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub description: String,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// A set of invariants checked together.
pub trait InvariantSet<S> {
    /// Returns every violated invariant, or `Ok(())` if all hold.
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>>;
}

impl<S, I1, I2> InvariantSet<S> for (I1, I2)
where
    I1: Invariant<S>,
    I2: Invariant<S>,
{
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>> {
        let mut violations = Vec::new();

        if !I1::holds(state) {
            violations.push(InvariantViolation::new(I1::description()));
        }

        if !I2::holds(state) {
            violations.push(InvariantViolation::new(I2::description()));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Invariant: X moves first and marks alternate, so X count minus O count is 0 or 1.
pub struct BalancedMarks;

impl Invariant<Board> for BalancedMarks {
    fn holds(board: &Board) -> bool {
        let x = board.count(Mark::X);
        let o = board.count(Mark::O);
        x == o || x == o + 1
    }

    fn description() -> &'static str {
        "X count minus O count is 0 or 1"
    }
}

/// Invariant: completed lines never belong to both marks.
pub struct SingleWinner;

impl Invariant<Board> for SingleWinner {
    fn holds(board: &Board) -> bool {
        let mut owners = LINES.into_iter().filter_map(|line| line_owner(board, line));
        match owners.next() {
            Some(first) => owners.all(|m| m == first),
            None => true,
        }
    }

    fn description() -> &'static str {
        "At most one mark owns a completed line"
    }
}

/// All board invariants as a composable set.
pub type BoardInvariants = (BalancedMarks, SingleWinner);

/// Checks every board invariant.
///
/// # Errors
///
/// Returns the list of violated invariants.
#[instrument(skip(board))]
pub fn check_board(board: &Board) -> Result<(), Vec<InvariantViolation>> {
    BoardInvariants::check_all(board)
}

/// The mark due to move on `board` under strict alternation.
pub fn expected_turn_owner(board: &Board) -> Mark {
    if board.count(Mark::X) > board.count(Mark::O) {
        Mark::O
    } else {
        Mark::X
    }
}

/// True iff `next` equals `previous` or fills exactly one square `previous` left empty.
#[instrument(skip(previous, next))]
pub fn is_valid_successor(previous: &Board, next: &Board) -> bool {
    let mut changed = 0;
    for (before, after) in previous.squares().iter().zip(next.squares()) {
        if before == after {
            continue;
        }
        if *before != Square::Empty {
            return false;
        }
        changed += 1;
    }
    changed <= 1
}
