//! Network infrastructure for the input-context broker.
//!
//! # Sub-modules
//!
//! - **`listener`** – Creates the private socket directory, binds the Unix
//!   socket and runs the accept loop.
//!
//! - **`connection`** – One task per accepted stream: frame reader, writer
//!   queue, and the [`connection::SocketChannel`] the broker sends through.
//!
//! - **`activation`** – Publishes the socket address on the session bus so
//!   clients can find it. Optional; failures only degrade discovery.

pub mod activation;
pub mod connection;
pub mod listener;
