//! User row operations: reads on the pool, writes through the retrying runner.

mod read;
mod write;
