pub mod buffer;
pub mod decoder;
pub mod encoder;
