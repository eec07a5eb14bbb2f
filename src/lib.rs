// Magpie - agent session pattern harvester
// Library exports

pub mod cli;
pub mod config;
pub mod detect;
pub mod discovery;
pub mod document;
pub mod errors;
pub mod filter;
pub mod pipeline;
pub mod publish;
pub mod sessions;
pub mod state;
