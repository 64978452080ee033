#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Gaussian Bayesian network learning and conditional prediction for
//! tabular continuous data.

pub mod config;
pub mod data;
pub mod evaluate;
pub mod gaussian;
pub mod graph;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod precision;
pub mod regression;
pub mod score;
pub mod search;
