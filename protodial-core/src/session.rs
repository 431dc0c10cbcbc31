//! # Session
//!
//! The contract between the engine and a presentation layer (a CLI, a desktop UI, ...).
//!
//! A [`Session`] answers three commands:
//!
//! * [`Session::process_protos`]: resolve a proto tree and publish a new catalog snapshot.
//! * [`Session::service_selected`]: list a service's methods and the input shape of the first one.
//! * [`Session::send`]: build a request from `(tag, value)` pairs, invoke the method and
//!   append one rendered text block per response to an [`OutputSink`] as responses arrive.
//!
//! Catalog snapshots are immutable. A new `process_protos` swaps the snapshot atomically;
//! callers still holding the previous `Arc<ProtoCatalog>` keep reading it undisturbed.
use crate::{
    BoxError,
    catalog::{LookupError, ProtoCatalog},
    invoker::{InvocationError, InvocationResult, InvokeOptions, Invoker, ensure_supported},
    message::{BuildError, InputField, build},
    resolver::{ProtoDescriptorSet, ResolveError, Resolver, ResolverConfig},
};
use arc_swap::ArcSwapOption;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("No protos have been processed yet")]
    NoCatalog,
    #[error("Invalid request: '{0}'")]
    Build(#[from] BuildError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error("{source} (after {emitted} response(s))")]
    Interrupted {
        emitted: usize,
        #[source]
        source: InvocationError,
    },
}

impl From<LookupError> for SendError {
    fn from(err: LookupError) -> Self {
        SendError::Invocation(InvocationError::Lookup(err))
    }
}

/// Append-only destination for rendered responses.
pub trait OutputSink {
    /// Called once at the start of every send.
    fn reset(&mut self);
    /// Called once per response, in receipt order.
    fn append(&mut self, block: String);
}

impl OutputSink for Vec<String> {
    fn reset(&mut self) {
        self.clear();
    }

    fn append(&mut self, block: String) {
        self.push(block);
    }
}

/// Forwards blocks to a receiver, e.g. a UI task. Blocks sent after the receiver is gone
/// are dropped.
impl OutputSink for UnboundedSender<String> {
    fn reset(&mut self) {}

    fn append(&mut self, block: String) {
        if self.send(block).is_err() {
            tracing::debug!("Output receiver dropped, discarding block");
        }
    }
}

/// Renders a response as a pretty-printed JSON object.
pub fn render(message: &DynamicMessage) -> String {
    serde_json::to_string_pretty(message).unwrap_or_else(|_| format!("{message:?}"))
}

/// The input message of a method, as shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputShape {
    /// Fully qualified input type name.
    pub message: String,
    pub fields: Vec<InputField>,
}

impl From<&MethodDescriptor> for InputShape {
    fn from(method: &MethodDescriptor) -> Self {
        let input = method.input();
        Self {
            message: input.full_name().to_string(),
            fields: crate::message::input_fields(&input),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSelection {
    pub service: String,
    pub methods: Vec<String>,
    /// The auto-selected (first) method, if the service has any.
    pub selected_method: Option<String>,
    pub input: Option<InputShape>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceListing {
    pub services: Vec<String>,
    /// The auto-selected (first) service, if any.
    pub selection: Option<ServiceSelection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// Number of blocks appended to the sink.
    pub blocks: usize,
}

#[derive(Debug, Default)]
pub struct Session {
    resolver_config: ResolverConfig,
    catalog: ArcSwapOption<ProtoCatalog>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `config` for discovery. Its `import_paths` are searched after the ones given
    /// to [`Session::process_protos`].
    pub fn with_resolver_config(config: ResolverConfig) -> Self {
        Self {
            resolver_config: config,
            catalog: ArcSwapOption::empty(),
        }
    }

    /// The current catalog snapshot.
    pub fn catalog(&self) -> Option<Arc<ProtoCatalog>> {
        self.catalog.load_full()
    }

    /// Resolves every `.proto` file under `root` and publishes the resulting catalog.
    ///
    /// `root` is the first import root, `imports` (shared definitions) the second. On
    /// failure the previous snapshot stays in place.
    pub fn process_protos(
        &self,
        imports: Option<&Path>,
        root: &Path,
    ) -> Result<ServiceListing, SessionError> {
        let mut import_paths = vec![root.to_path_buf()];
        import_paths.extend(imports.map(Path::to_path_buf));
        import_paths.extend(self.resolver_config.import_paths.iter().cloned());

        let resolver = Resolver::new(ResolverConfig {
            import_paths,
            excluded_dirs: self.resolver_config.excluded_dirs.clone(),
        });

        let set = resolver.resolve(root)?;
        Ok(self.publish(set))
    }

    /// Publishes a catalog built from an already resolved descriptor set.
    pub fn publish(&self, set: ProtoDescriptorSet) -> ServiceListing {
        let catalog = Arc::new(ProtoCatalog::new(set));
        self.catalog.store(Some(catalog.clone()));

        let services = catalog.services().to_vec();
        let selection = services
            .first()
            .map(|first| selection(&catalog, first));

        ServiceListing {
            services,
            selection,
        }
    }

    /// Lists the methods of `service` and the input shape of its first method.
    ///
    /// Unknown services (or no catalog at all) yield an empty selection.
    pub fn service_selected(&self, service: &str) -> ServiceSelection {
        match self.catalog() {
            Some(catalog) => selection(&catalog, service),
            None => ServiceSelection {
                service: service.to_string(),
                ..ServiceSelection::default()
            },
        }
    }

    /// The input shape of any method, e.g. after the caller picks a method other than the first.
    pub fn method_selected(&self, service: &str, method: &str) -> Result<InputShape, SendError> {
        let catalog = self.catalog().ok_or(SendError::NoCatalog)?;
        let method = catalog.find_method(service, method)?;
        Ok(InputShape::from(&method))
    }

    /// Builds the request, dials `host` and streams rendered responses into `sink`.
    ///
    /// Blank values are treated as unset fields.
    #[allow(clippy::too_many_arguments)]
    pub async fn send<K: OutputSink>(
        &self,
        host: &str,
        service: &str,
        method: &str,
        field_values: &[(u32, String)],
        sink: &mut K,
        options: &InvokeOptions,
        cancel: &CancellationToken,
    ) -> Result<SendReport, SendError> {
        sink.reset();

        let (method, request) = self.prepare(service, method, field_values)?;
        let mut invoker = Invoker::connect(host, options, cancel).await?;

        deliver(&mut invoker, &method, request, sink, cancel).await
    }

    /// Same as [`Session::send`] over an existing invoker (custom transports, in-process servers).
    pub async fn send_with<S, K>(
        &self,
        invoker: &mut Invoker<S>,
        service: &str,
        method: &str,
        field_values: &[(u32, String)],
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<SendReport, SendError>
    where
        S: tonic::client::GrpcService<tonic::body::Body>,
        S::Error: Into<BoxError>,
        S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
        <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
        K: OutputSink,
    {
        sink.reset();

        let (method, request) = self.prepare(service, method, field_values)?;

        deliver(invoker, &method, request, sink, cancel).await
    }

    fn prepare(
        &self,
        service: &str,
        method: &str,
        field_values: &[(u32, String)],
    ) -> Result<(MethodDescriptor, DynamicMessage), SendError> {
        let catalog = self.catalog().ok_or(SendError::NoCatalog)?;
        let method = catalog.find_method(service, method)?;
        ensure_supported(&method)?;

        let values = field_values
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(tag, value)| (*tag, value.as_str()));
        let request = build(&method.input(), values)?;

        Ok((method, request))
    }
}

fn selection(catalog: &ProtoCatalog, service: &str) -> ServiceSelection {
    let methods = catalog.methods(service);
    let first = methods.first();

    ServiceSelection {
        service: service.to_string(),
        methods: methods.iter().map(|m| m.name().to_string()).collect(),
        selected_method: first.map(|m| m.name().to_string()),
        input: first.map(InputShape::from),
    }
}

async fn deliver<S, K>(
    invoker: &mut Invoker<S>,
    method: &MethodDescriptor,
    request: DynamicMessage,
    sink: &mut K,
    cancel: &CancellationToken,
) -> Result<SendReport, SendError>
where
    S: tonic::client::GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    K: OutputSink,
{
    match invoker.invoke(method, request, cancel).await? {
        InvocationResult::Unary(response) => {
            sink.append(render(&response));
            Ok(SendReport { blocks: 1 })
        }
        InvocationResult::Streaming(mut stream) => {
            let mut emitted = 0;
            while let Some(next) = stream.next().await {
                match next {
                    Ok(response) => {
                        sink.append(render(&response));
                        emitted += 1;
                    }
                    Err(source) => return Err(SendError::Interrupted { emitted, source }),
                }
            }
            Ok(SendReport { blocks: emitted })
        }
    }
}
