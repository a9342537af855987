//! Example workloads
//!
//! - `primes`: partitioned prime search, the reference batch job

pub mod primes;
