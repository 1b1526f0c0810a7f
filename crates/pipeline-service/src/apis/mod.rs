//! HTTP handlers, one module per route group.

pub mod delivery;
pub mod health;
pub mod order;
pub mod subscription;
