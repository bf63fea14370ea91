mod support;
mod test_merge_limits;
mod test_splitter;
