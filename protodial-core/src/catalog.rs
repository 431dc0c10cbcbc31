//! # Proto Catalog
//!
//! A read-only index over a [`ProtoDescriptorSet`]: the services it declares, their methods
//! and the input shape of every method.
//!
//! Services are listed in file discovery order, then declaration order. Service names are
//! unique: the `DescriptorPool` behind every set rejects duplicate symbols, so a tree where
//! two files declare the same service fails to resolve with [`ResolveError::Parse`].
//!
//! [`ResolveError::Parse`]: crate::resolver::ResolveError::Parse
use crate::message::{InputField, input_fields};
use crate::resolver::ProtoDescriptorSet;
use prost_reflect::{EnumDescriptor, MessageDescriptor, MethodDescriptor, ServiceDescriptor};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),
    #[error("Method '{method}' not found in service '{service}'")]
    MethodNotFound { service: String, method: String },
}

/// A symbol found by [`ProtoCatalog::get_descriptor_by_symbol`].
#[derive(Debug, Clone)]
pub enum Descriptor {
    Service(ServiceDescriptor),
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
}

impl Descriptor {
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::Service(d) => d.full_name(),
            Descriptor::Message(d) => d.full_name(),
            Descriptor::Enum(d) => d.full_name(),
        }
    }

    /// `service`, `message` or `enum`, as the keyword appears in a `.proto` file.
    pub fn keyword(&self) -> &'static str {
        match self {
            Descriptor::Service(_) => "service",
            Descriptor::Message(_) => "message",
            Descriptor::Enum(_) => "enum",
        }
    }

    /// Name of the file declaring the symbol, relative to its import root.
    pub fn file_name(&self) -> String {
        let file = match self {
            Descriptor::Service(d) => d.parent_file(),
            Descriptor::Message(d) => d.parent_file(),
            Descriptor::Enum(d) => d.parent_file(),
        };
        file.name().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ProtoCatalog {
    set: ProtoDescriptorSet,
    names: Vec<String>,
    services: HashMap<String, ServiceDescriptor>,
}

impl ProtoCatalog {
    /// Indexes the services declared by the explicitly resolved files of `set`.
    ///
    /// Services that only exist in imported files are not listed.
    pub fn new(set: ProtoDescriptorSet) -> Self {
        let services: Vec<ServiceDescriptor> =
            set.files().flat_map(|file| file.services().collect::<Vec<_>>()).collect();
        let names: Vec<String> = services.iter().map(|s| s.full_name().to_string()).collect();
        let services = names.iter().cloned().zip(services).collect();

        tracing::info!(
            files = set.file_names().len(),
            services = names.len(),
            "Proto catalog built"
        );

        Self {
            set,
            names,
            services,
        }
    }

    pub fn descriptor_set(&self) -> &ProtoDescriptorSet {
        &self.set
    }

    /// Fully qualified service names (e.g. `helloworld.Greeter`).
    pub fn services(&self) -> &[String] {
        &self.names
    }

    pub fn service(&self, service: &str) -> Option<&ServiceDescriptor> {
        self.services.get(service)
    }

    /// Methods of `service` in declaration order. Unknown services have no methods.
    pub fn methods(&self, service: &str) -> Vec<MethodDescriptor> {
        self.service(service)
            .map(|s| s.methods().collect())
            .unwrap_or_default()
    }

    pub fn find_method(&self, service: &str, method: &str) -> Result<MethodDescriptor, LookupError> {
        self.service(service)
            .ok_or_else(|| LookupError::ServiceNotFound(service.to_string()))?
            .methods()
            .find(|m| m.name() == method)
            .ok_or_else(|| LookupError::MethodNotFound {
                service: service.to_string(),
                method: method.to_string(),
            })
    }

    /// The ordered `{label, tag, kind}` shape of the method's input message.
    pub fn input_fields(&self, method: &MethodDescriptor) -> Vec<InputField> {
        input_fields(&method.input())
    }

    /// Looks up a service, message or enum (in that order) by fully qualified name.
    ///
    /// Symbols from imported files are found too.
    pub fn get_descriptor_by_symbol(&self, symbol: &str) -> Option<Descriptor> {
        let pool = self.set.pool();

        if let Some(descriptor) = pool.get_service_by_name(symbol) {
            return Some(Descriptor::Service(descriptor));
        }
        if let Some(descriptor) = pool.get_message_by_name(symbol) {
            return Some(Descriptor::Message(descriptor));
        }
        if let Some(descriptor) = pool.get_enum_by_name(symbol) {
            return Some(Descriptor::Enum(descriptor));
        }
        None
    }
}
