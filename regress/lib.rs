#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod config;
pub mod cv;
pub mod data;
pub mod encode;
pub mod evaluate;
pub mod model;
pub mod ols;
pub mod penalized;
pub mod pipeline;
pub mod report;
pub mod split;
pub mod subset;

#[cfg(test)]
mod test_fixtures;
