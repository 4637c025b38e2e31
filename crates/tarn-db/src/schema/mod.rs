pub mod documents;
pub mod tarballs;
