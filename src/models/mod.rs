//! Domain models: configuration, calendar math, daily tables, and the deck
//! document.

pub mod calendar;
pub mod config;
pub mod deck;
pub mod frame;
