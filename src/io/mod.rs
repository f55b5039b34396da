//! Input loading: CSV files (local or HTTP) and annotation sources.

pub mod loaders;
