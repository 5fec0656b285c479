#![allow(dead_code)]

pub mod cluster;
pub mod strategies;

pub use cluster::*;
pub use strategies::*;
