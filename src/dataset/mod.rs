//! Training data preparation.

pub mod images;
pub mod split;
