// src/lib.rs — tabiter: iterative tabular competition agent

pub mod cli;
pub mod core;
pub mod gateway;
pub mod infra;
pub mod memory;
pub mod phases;
pub mod sandbox;
