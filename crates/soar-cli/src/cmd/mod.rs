pub mod approve;
pub mod classify;
pub mod clear;
pub mod config;
pub mod propose;
pub mod status;
