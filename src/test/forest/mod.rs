/// Tests for the random forest experiment stages
///
/// * `test_split` - Positional train/test partition of usable rows
/// * `test_determinism` - Identical results for a fixed seed
pub mod test_determinism;
pub mod test_split;
