//! Group/member directory lookups over TCP and UDP.
//!
//! Clients send one text command per line (`GET <group> <member>`, `STOP`,
//! `STOP_SESSION`) and receive the member's name or an error string. The
//! directory is loaded once at startup and never changes afterwards.
//!
//! - [`directory`] holds the immutable lookup table and its text loader.
//! - [`protocol`] tokenizes lines into commands and executes them.
//! - [`shutdown`] is the flag any client can raise with `STOP`.
//! - [`worker`] drives one TCP connection's command stream.
//! - [`listener`] accepts TCP connections and joins their workers on exit.
//! - [`datagram`] serves the same protocol over UDP in a single loop.
//! - [`config`] carries the options shared by both transports.
//! - [`cli`] and [`client`] back the `directory-lookup` binary.

pub mod cli;
pub mod client;
pub mod config;
pub mod datagram;
pub mod directory;
pub mod listener;
pub mod protocol;
pub mod shutdown;
pub mod worker;
