//! Small building blocks shared by the tarn crates.

pub mod bytes;
pub mod error;
pub mod fs;
pub mod hash;
pub mod keyed;
pub mod lock;
pub mod path;
pub mod time;
