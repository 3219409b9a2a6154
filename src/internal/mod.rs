//! Internal building blocks (index, object model, pack, zlib) that power
//! the repository and protocol layers.

pub mod index;
pub mod object;
pub mod pack;
pub mod zlib;
