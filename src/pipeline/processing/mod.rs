// Pipeline processing: normalization, per-source cleaning, joins and outcome labels

pub mod binarize;
pub mod clean;
pub mod merge;
pub mod normalize;
pub mod states;
