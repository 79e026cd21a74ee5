pub mod parser;
pub mod splitter;
