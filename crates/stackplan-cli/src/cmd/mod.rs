pub mod actions;
pub mod config;
pub mod explain;
pub mod plan;
pub mod run;
pub mod stack;
