//! Property-based tests

mod event_proptest;
mod pagination_proptest;
