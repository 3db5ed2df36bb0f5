//! The cache daemon process: a dispatcher reading the request queue, a
//! fixed worker pool, and the read-only file cache they consult.

pub mod dispatcher;
pub mod file_cache;
pub mod worker;
