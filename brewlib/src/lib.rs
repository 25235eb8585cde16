#![cfg_attr(not(feature = "std"), no_std)]

pub mod backoff;
pub mod bootloader;
pub mod event;

mod link;
pub use link::*;

pub mod liveness;
pub mod protocol;
pub mod time;

mod version;
pub use version::*;

#[cfg(test)]
mod testing;
