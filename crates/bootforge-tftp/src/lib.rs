//! Read-only TFTP listener.
//!
//! PXE firmware fetches exactly two things from us before switching to HTTP:
//! the iPXE binary and the autoexec script. This crate implements the
//! minimum TFTP surface for that: RFC 1350 lockstep reads with blksize and
//! tsize negotiation (RFC 2347/2348/2349). Writes are rejected.

pub mod error;
pub mod packet;
pub mod server;

pub use error::*;
pub use packet::*;
pub use server::*;
