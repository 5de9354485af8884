#![allow(async_fn_in_trait)]
pub mod archive;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod context;
pub mod download_plan;
pub mod error;
pub mod logging;
pub mod orbit;
pub mod planner;
pub mod product;
pub mod progress;
pub mod request;
pub mod selection;
pub mod timestamp;
