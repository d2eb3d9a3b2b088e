//! Storage engine tests

mod recovery_tests;
