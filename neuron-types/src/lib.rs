#![doc = include_str!("../README.md")]

pub mod agent;
pub mod error;
pub mod stream;
pub mod traits;
pub mod types;
pub mod wasm;

pub use agent::*;
pub use error::*;
pub use stream::*;
pub use traits::*;
pub use types::*;
pub use wasm::*;
