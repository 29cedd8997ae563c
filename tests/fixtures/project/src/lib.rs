//! Tiny library used by the docwatch integration tests.

/// Add two numbers.
pub fn add(a: i32, b: i32) -> i32 {
    a + b
}

/// Subtract two numbers.
pub fn sub(a: i32, b: i32) -> i32 {
    a - b
}
