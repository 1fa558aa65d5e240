//! Mock card implementation for testing and development.
//!
//! [`MockCard`] behaves like an attached Open8055 board: it answers
//! GETINPUT/GETCONFIG, applies OUTPUT and SETCONFIG1 reports, and lets a
//! [`MockCardHandle`] drive its inputs and inspect what the host sent.

pub mod card;

pub use card::{MockCard, MockCardHandle};
