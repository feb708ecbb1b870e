//! Chaos engineering test suite for the broadcast protocol.
//!
//! These tests verify that every message eventually reaches every node
//! despite network partitions and message loss, and that the benchmark
//! grid converges within its diameter.

mod grid;
mod message_loss;
mod split_brain;
