//! Verifiable multi-server private information retrieval over GF(2^128).
//!
//! A client fetches the i-th block of a database replicated across two or
//! more servers without revealing i to any single server, and detects
//! cooperative tampering with the returned block through a MAC-like tag
//! checked at reconstruction. Queries are built either by additive secret
//! sharing (any number of servers) or from a distributed point function
//! (exactly two servers). A classical XOR-based PIR mode, optionally backed
//! by a Merkle-authenticated database, is also provided.

pub mod client;
pub mod cluster;
pub mod config;
pub mod database;
pub mod dpf;
pub mod field;
pub mod framing;
pub mod merkle;
pub mod messages;
pub mod persist;
pub mod server;
pub mod service;
pub mod transport;
pub mod xof;

pub use client::{DpfClient, ItClient, PirClient};
pub use database::{BytesDb, Db, Info, PirMode};
pub use field::Element;
pub use messages::{Scheme, SchemeError, StorageError, TransportError};
pub use server::{PirServer, Server};
pub use xof::Xof;
