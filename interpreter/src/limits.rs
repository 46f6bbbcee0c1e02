pub(crate) const MAX_PARAMETERS: usize = 255;
pub(crate) const DEFAULT_MAX_CALL_DEPTH: usize = 200;
pub(crate) const DEFAULT_STACK_TRACE_LIMIT: usize = 20;

// Floats are keyed on a fixed precision so that nearly equal values land in the same slot
pub(crate) const FLOAT_HASH_SCALE: f64 = 1_000_000.0;

pub(crate) const SOURCE_EXTENSION: &str = "crl";

// Upper bound on elements a single repetition or `range` may produce
pub(crate) const MAX_SEQUENCE_LENGTH: usize = 1 << 26;
