#![allow(async_fn_in_trait)]
pub mod acquisition;
pub mod auth;
pub mod borders;
pub mod dates;
pub mod error;
pub mod fetch;
pub mod grid;
pub mod imagery;
pub mod quality;
pub mod sentinel_hub;
pub mod settings;
pub mod storage;
