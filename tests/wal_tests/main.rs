//! Write-ahead log tests

mod entry_tests;
mod writer_tests;
