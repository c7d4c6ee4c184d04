pub extern crate bincode;
pub extern crate chrono;
pub extern crate euclid;
pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;

mod codec;
mod drawing;
mod message;

pub use codec::*;
pub use drawing::*;
pub use message::*;
