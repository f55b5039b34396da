//! Pure table-in/table-out transformation passes.

pub mod merge;
