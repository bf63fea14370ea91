pub mod merge_reader;
pub mod region;
pub mod splitter;
