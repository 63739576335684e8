//! Index artifact lifecycle tests: naming, persistence, corruption and
//! concurrent builders.

mod persistence_test;
mod concurrency_test;
