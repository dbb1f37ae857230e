//! Pure tic-tac-toe rules.
//!
//! Board representation, win and draw detection, legal-move checks, move
//! application and turn ownership. Nothing here performs I/O; the same
//! functions back optimistic local moves and the checks applied to boards
//! received from other clients.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod types;

pub mod invariants;
pub mod rules;

pub use action::{IllegalMoveError, apply_move, can_move, is_legal_move, mark_for};
pub use rules::{LINES, Outcome, is_draw, is_full, outcome, winner};
pub use types::{BOARD_SIZE, Board, Mark, Square};
