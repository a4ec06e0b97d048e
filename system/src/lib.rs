mod claim;
pub mod color;
mod grid;
mod message;
mod traits;
mod types;

pub use claim::*;
pub use color::ColorAllocator;
pub use grid::*;
pub use message::*;
pub use traits::*;
pub use types::*;

pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;
