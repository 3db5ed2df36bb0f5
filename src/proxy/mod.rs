//! The proxy process: a Getfile listener, a fixed worker pool, and the
//! segment pool those workers lease from to talk to the cache daemon.

pub mod dispatcher;
pub mod getfile;
pub mod origin;
pub mod worker;
