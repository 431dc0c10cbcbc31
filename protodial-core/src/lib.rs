//! # Protodial Core
//!
//! `protodial-core` is the engine behind the Protodial CLI. It calls any gRPC method
//! straight from a directory of `.proto` sources: no generated stubs, no `protoc`, no
//! server reflection required.
//!
//! ## Key Components
//!
//! * **[`resolver`]:** Discovers `.proto` files under a root and parses them into a
//!   [`resolver::ProtoDescriptorSet`].
//! * **[`catalog`]:** Lists services, methods and method input shapes of a descriptor set.
//! * **[`message`]:** Builds a `DynamicMessage` from `(field tag, string value)` pairs,
//!   coercing each value to the field's scalar kind.
//! * **[`invoker`]:** Dispatches a request as a unary or server-streaming call and exposes
//!   the responses, one at a time, in receipt order.
//! * **[`session`]:** Ties the above together behind the three commands a presentation
//!   layer needs (`process_protos`, `service_selected`, `send`).
//!
//! ## Internal clients
//!
//! * **[`GrpcClient`](grpc::client::GrpcClient):** A dynamic gRPC client using a custom codec.
//!
//! ## DynamicCodec
//!
//! An implementation of `tonic::codec::Codec` that writes `DynamicMessage`s to the wire and
//! decodes responses with the method's output descriptor.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, `tokio-util` and `tonic` to ensure that
//! consumers use compatible versions of these underlying dependencies.
pub mod catalog;
pub mod grpc;
pub mod invoker;
pub mod message;
pub mod resolver;
pub mod session;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tokio_util;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
