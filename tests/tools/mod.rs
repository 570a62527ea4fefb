//! Tool-level operation tests.
