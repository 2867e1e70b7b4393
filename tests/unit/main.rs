#[path = "../common/mod.rs"]
mod common;

mod event;
mod middleware;
