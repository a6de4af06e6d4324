//! Property-based tests for item sets and change requests

mod items;
