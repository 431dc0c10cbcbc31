//! # RPC Invoker
//!
//! Sends a dynamically built request to a live gRPC endpoint.
//!
//! Every invocation walks the same state machine:
//!
//! ```text
//! Connecting -> Sending -> UnaryAwait ------> Done
//!                       \-> StreamReceiving -> Done
//! (any state) -> Failed
//! ```
//!
//! Dispatch is decided by the method descriptor: server-streaming methods return a
//! [`ResponseStream`] that is read one message at a time, everything else awaits a single
//! response. Client-streaming and bidirectional methods are rejected up front with
//! [`InvocationError::UnsupportedStreamingMode`].
//!
//! Each await point (dial, unary response, next stream message) races a
//! `CancellationToken`. Nothing is retried.
use crate::{
    BoxError,
    catalog::{LookupError, ProtoCatalog},
    grpc::client::{GrpcClient, GrpcRequestError},
};
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor, ReflectMessage};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::{
    Status, Streaming,
    transport::{Channel, Endpoint},
};

#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("Invalid host '{host}': '{source}'")]
    InvalidHost {
        host: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("Failed to connect to '{host}': '{source}'")]
    Dial {
        host: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("Method '{0}' uses client streaming, only unary and server streaming calls are supported")]
    UnsupportedStreamingMode(String),
    #[error("Request is a '{actual}' but method expects a '{expected}'")]
    InputMismatch { expected: String, actual: String },
    #[error("gRPC client request error: '{0}'")]
    Request(#[from] GrpcRequestError),
    #[error("gRPC call failed: code={:?} message={:?}", .0.code(), .0.message())]
    Rpc(Status),
    #[error("Invocation cancelled")]
    Cancelled,
}

/// The phases of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Connecting,
    Sending,
    UnaryAwait,
    StreamReceiving,
    Done,
    Failed,
}

fn transition(method: &str, state: InvocationState) {
    tracing::debug!(method, ?state, "Invocation state changed");
}

#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Upper bound for establishing the connection. `None` waits for the transport default.
    pub connect_timeout: Option<Duration>,
    /// Custom gRPC metadata attached to the request.
    pub headers: Vec<(String, String)>,
}

/// The outcome of a successful dispatch.
#[derive(Debug)]
pub enum InvocationResult {
    Unary(DynamicMessage),
    Streaming(ResponseStream),
}

/// Responses of a server-streaming call, pulled one at a time in receipt order.
///
/// Dropping the stream releases the underlying call.
#[derive(Debug)]
pub struct ResponseStream {
    method: String,
    inner: Streaming<DynamicMessage>,
    cancel: CancellationToken,
    state: InvocationState,
    received: usize,
}

impl ResponseStream {
    fn new(method: String, inner: Streaming<DynamicMessage>, cancel: CancellationToken) -> Self {
        Self {
            method,
            inner,
            cancel,
            state: InvocationState::StreamReceiving,
            received: 0,
        }
    }

    /// Waits for the next response.
    ///
    /// # Returns
    ///
    /// * `Some(Ok(DynamicMessage))` - The next message.
    /// * `Some(Err(InvocationError))` - The stream failed or was cancelled. It yields nothing afterwards.
    /// * `None` - The server closed the stream (or it already failed).
    pub async fn next(&mut self) -> Option<Result<DynamicMessage, InvocationError>> {
        if self.state != InvocationState::StreamReceiving {
            return None;
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(InvocationError::Cancelled),
            message = self.inner.message() => message.map_err(InvocationError::Rpc),
        };

        match result {
            Ok(Some(message)) => {
                self.received += 1;
                Some(Ok(message))
            }
            Ok(None) => {
                self.state = InvocationState::Done;
                transition(&self.method, self.state);
                None
            }
            Err(err) => {
                self.state = InvocationState::Failed;
                transition(&self.method, self.state);
                Some(Err(err))
            }
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Number of messages handed out so far.
    pub fn received(&self) -> usize {
        self.received
    }
}

/// Dispatches dynamic requests over a single gRPC transport.
#[derive(Debug, Clone)]
pub struct Invoker<S = Channel> {
    grpc_client: GrpcClient<S>,
    headers: Vec<(String, String)>,
}

impl Invoker<Channel> {
    /// Opens a plaintext (no TLS) channel to `host`.
    ///
    /// Hosts without a scheme (e.g. `localhost:50051`) are dialed over `http://`.
    ///
    /// # Returns
    ///
    /// * `Ok(Invoker<Channel>)` - The connected invoker.
    /// * `Err(InvocationError)` - `InvalidHost`, `Dial` or `Cancelled`.
    pub async fn connect(
        host: &str,
        options: &InvokeOptions,
        cancel: &CancellationToken,
    ) -> Result<Self, InvocationError> {
        transition(host, InvocationState::Connecting);

        let uri = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };

        let mut endpoint = Endpoint::new(uri).map_err(|source| InvocationError::InvalidHost {
            host: host.to_string(),
            source,
        })?;
        if let Some(timeout) = options.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        let channel = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InvocationError::Cancelled),
            result = endpoint.connect() => result.map_err(|source| InvocationError::Dial {
                host: host.to_string(),
                source,
            }),
        }
        .inspect_err(|_| transition(host, InvocationState::Failed))?;

        Ok(Self::from_service(channel).with_headers(options.headers.clone()))
    }
}

impl<S> Invoker<S>
where
    S: tonic::client::GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Creates an invoker from an existing Tonic service/channel.
    pub fn from_service(service: S) -> Self {
        Self {
            grpc_client: GrpcClient::new(service),
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Sends `request` to `method` and waits for the unary response or the stream head.
    pub async fn invoke(
        &mut self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, InvocationError> {
        let full_name = method.full_name().to_string();
        let result = self.dispatch(method, request, cancel).await;
        if result.is_err() {
            transition(&full_name, InvocationState::Failed);
        }
        result
    }

    async fn dispatch(
        &mut self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, InvocationError> {
        ensure_supported(method)?;

        let input = method.input();
        if request.descriptor() != input {
            return Err(InvocationError::InputMismatch {
                expected: input.full_name().to_string(),
                actual: request.descriptor().full_name().to_string(),
            });
        }

        transition(method.full_name(), InvocationState::Sending);

        if method.is_server_streaming() {
            let streaming = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(InvocationError::Cancelled),
                result = self.grpc_client.server_streaming(method, request, &self.headers) => {
                    result?.map_err(InvocationError::Rpc)?
                }
            };

            transition(method.full_name(), InvocationState::StreamReceiving);
            return Ok(InvocationResult::Streaming(ResponseStream::new(
                method.full_name().to_string(),
                streaming,
                cancel.clone(),
            )));
        }

        transition(method.full_name(), InvocationState::UnaryAwait);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InvocationError::Cancelled),
            result = self.grpc_client.unary(method, request, &self.headers) => {
                result?.map_err(InvocationError::Rpc)?
            }
        };

        transition(method.full_name(), InvocationState::Done);
        Ok(InvocationResult::Unary(response))
    }
}

/// Rejects methods the invoker cannot dispatch.
pub fn ensure_supported(method: &MethodDescriptor) -> Result<(), InvocationError> {
    if method.is_client_streaming() {
        return Err(InvocationError::UnsupportedStreamingMode(
            method.full_name().to_string(),
        ));
    }
    Ok(())
}

/// One-shot invocation: looks the method up, dials `host` and dispatches `request`.
///
/// The method is resolved and checked before dialing, so lookup failures and unsupported
/// streaming modes never open a connection.
pub async fn invoke(
    host: &str,
    catalog: &ProtoCatalog,
    service: &str,
    method: &str,
    request: DynamicMessage,
    options: &InvokeOptions,
    cancel: &CancellationToken,
) -> Result<InvocationResult, InvocationError> {
    let method = catalog.find_method(service, method)?;
    ensure_supported(&method)?;

    let mut invoker = Invoker::connect(host, options, cancel).await?;
    invoker.invoke(&method, request, cancel).await
}
