//! Benchmarks for RecorDB. See `benches/`.
