//! Game rules for tic-tac-toe.
//!
//! Pure functions over [`Board`](crate::Board). Rules are separated from
//! board storage so callers can recompute the outcome of any board they
//! receive, whatever status it was stored with.

mod draw;
mod outcome;
mod win;

pub use draw::{is_draw, is_full};
pub use outcome::{Outcome, outcome};
pub use win::{LINES, winner};

pub(crate) use win::line_owner;
