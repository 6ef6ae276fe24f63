//! Domain types shared across the relay: currently just [`frame::Frame`].

pub mod frame;

pub use frame::Frame;
