//! # Echo Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide gRPC server implementations
//! and `.proto` sources for integration testing `protodial-core`.
//! It is not intended for production use.
//!
//! The `.proto` tree under [`PROTO_DIR`] is the same one the servers are generated from,
//! so tests can resolve it from source and call the servers with dynamic messages.

mod counter;
mod echo;
mod greeter;

pub mod pb {
    pub mod common {
        include!(concat!(env!("OUT_DIR"), "/common.rs"));
    }

    pub mod counter {
        include!(concat!(env!("OUT_DIR"), "/counter.rs"));
    }

    pub mod echo {
        include!(concat!(env!("OUT_DIR"), "/echo.rs"));
    }

    /// `greet.proto` declares no package.
    pub mod greet {
        include!(concat!(env!("OUT_DIR"), "/_.rs"));
    }
}

pub use counter::CounterImpl;
pub use echo::EchoServiceImpl;
pub use greeter::GreeterImpl;
pub use pb::counter::counter_server::CounterServer;
pub use pb::echo::echo_service_server::EchoServiceServer;
pub use pb::greet::greeter_server::GreeterServer;

/// Root of the fixture `.proto` tree.
pub const PROTO_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/proto");

/// The compiled fixture tree as a binary `FileDescriptorSet`.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");
