use colored::*;
use protodial_core::{
    catalog::Descriptor,
    invoker::InvocationError,
    message::{FieldKind, InputField},
    prost_reflect::{EnumDescriptor, Kind, MessageDescriptor, MethodDescriptor, ServiceDescriptor},
    resolver::ResolveError,
    session::{InputShape, SendError, ServiceSelection, SessionError},
};
use std::fmt::Display;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

pub struct ServiceList(pub Vec<String>);

/// A rendered response block, printed as soon as it arrives.
pub struct ResponseBlock(pub String);

pub struct GenericError<T: Display>(pub &'static str, pub T);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<ResponseBlock> for FormattedString {
    fn from(ResponseBlock(block): ResponseBlock) -> Self {
        FormattedString(block)
    }
}

impl From<ResolveError> for FormattedString {
    fn from(err: ResolveError) -> Self {
        FormattedString(format!(
            "{}\n\n'{}'",
            "Failed to resolve protos:".red().bold(),
            err
        ))
    }
}

impl From<SessionError> for FormattedString {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Resolve(err) => FormattedString::from(err),
        }
    }
}

impl From<InvocationError> for FormattedString {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Rpc(status) => FormattedString(format!(
                "{} code={:?} message={:?}",
                "gRPC Failed:".red().bold(),
                status.code(),
                status.message()
            )),
            InvocationError::Cancelled => FormattedString("Cancelled.".yellow().to_string()),
            InvocationError::InvalidHost { .. } | InvocationError::Dial { .. } => {
                FormattedString(format!("{}\n\n'{}'", "Connection Error:".red().bold(), err))
            }
            InvocationError::Lookup(err) => FormattedString(format!(
                "{}\n\n'{}'",
                "Symbol Lookup Failed:".red().bold(),
                err
            )),
            err => FormattedString(format!("{}\n\n'{}'", "Call Failed:".red().bold(), err)),
        }
    }
}

impl From<SendError> for FormattedString {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Invocation(err) => FormattedString::from(err),
            SendError::Interrupted { emitted, source } => {
                let FormattedString(reason) = FormattedString::from(source);
                FormattedString(format!(
                    "{}\n{}",
                    reason,
                    format!("(stream stopped after {emitted} response(s))").yellow()
                ))
            }
            err => FormattedString(format!("{}\n\n'{}'", "Call Failed:".red().bold(), err)),
        }
    }
}

impl<T: Display> From<GenericError<T>> for FormattedString {
    fn from(GenericError(msg, err): GenericError<T>) -> Self {
        FormattedString(format!("{}:\n\n'{}'", msg.red().bold(), err))
    }
}

impl From<ServiceList> for FormattedString {
    fn from(ServiceList(services): ServiceList) -> Self {
        if services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        out.push_str("Available Services:\n");
        for svc in services {
            out.push_str(&format!("  - {}\n", svc.green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

fn input_field(field: &InputField) -> String {
    let kind = match &field.kind {
        FieldKind::Scalar(scalar) => scalar.to_string().yellow(),
        FieldKind::Unsupported(type_name) => format!("{type_name} (not settable)").dimmed(),
    };
    format!("  {:>3}  {} {}", field.tag.to_string().purple(), field.label, kind)
}

impl From<InputShape> for FormattedString {
    fn from(shape: InputShape) -> Self {
        let mut out = format!("{} {}\n", "input".cyan(), shape.message.green());
        if shape.fields.is_empty() {
            out.push_str(&format!("  {}", "(no fields)".dimmed()));
        }
        for field in &shape.fields {
            out.push_str(&input_field(field));
            out.push('\n');
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<ServiceSelection> for FormattedString {
    fn from(selection: ServiceSelection) -> Self {
        if selection.methods.is_empty() {
            return FormattedString(format!(
                "{} {}",
                "No methods found for".yellow(),
                selection.service.green()
            ));
        }

        let mut out = format!("{} {}:\n", "Methods of".cyan(), selection.service.green());
        for method in &selection.methods {
            let marker = if selection.selected_method.as_ref() == Some(method) {
                "*"
            } else {
                "-"
            };
            out.push_str(&format!("  {} {}\n", marker, method.green()));
        }

        if let Some(input) = selection.input {
            out.push('\n');
            out.push_str(&FormattedString::from(input).0);
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<Descriptor> for FormattedString {
    fn from(descriptor: Descriptor) -> Self {
        let origin = format!(
            "// {} {} declared in {}",
            descriptor.keyword(),
            descriptor.full_name(),
            descriptor.file_name()
        )
        .dimmed();
        let FormattedString(body) = match descriptor {
            Descriptor::Service(d) => FormattedString::from(d),
            Descriptor::Message(d) => FormattedString::from(d),
            Descriptor::Enum(d) => FormattedString::from(d),
        };
        FormattedString(format!("{origin}\n{body}"))
    }
}

impl From<ServiceDescriptor> for FormattedString {
    fn from(service: ServiceDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "service".cyan(),
            service.name().green()
        ));

        for method in service.methods() {
            out.push_str("  ");
            out.push_str(&FormattedString::from(method).0);
            out.push_str("\n\n");
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<MethodDescriptor> for FormattedString {
    fn from(method: MethodDescriptor) -> Self {
        let input_stream = if method.is_client_streaming() {
            format!("{} ", "stream".cyan())
        } else {
            "".to_string()
        };
        let output_stream = if method.is_server_streaming() {
            format!("{} ", "stream".cyan())
        } else {
            "".to_string()
        };

        FormattedString(format!(
            "{} {}({}{}) {} ({}{});",
            "rpc".cyan(),
            method.name().green(),
            input_stream,
            method.input().full_name().yellow(),
            "returns".cyan(),
            output_stream,
            method.output().full_name().yellow()
        ))
    }
}

fn kind_name(kind: &Kind) -> ColoredString {
    match kind {
        Kind::Double => "double".yellow(),
        Kind::Float => "float".yellow(),
        Kind::Int32 => "int32".yellow(),
        Kind::Int64 => "int64".yellow(),
        Kind::Uint32 => "uint32".yellow(),
        Kind::Uint64 => "uint64".yellow(),
        Kind::Sint32 => "sint32".yellow(),
        Kind::Sint64 => "sint64".yellow(),
        Kind::Fixed32 => "fixed32".yellow(),
        Kind::Fixed64 => "fixed64".yellow(),
        Kind::Sfixed32 => "sfixed32".yellow(),
        Kind::Sfixed64 => "sfixed64".yellow(),
        Kind::Bool => "bool".yellow(),
        Kind::String => "string".yellow(),
        Kind::Bytes => "bytes".yellow(),
        Kind::Message(m) => m.full_name().yellow(),
        Kind::Enum(e) => e.full_name().yellow(),
    }
}

impl From<MessageDescriptor> for FormattedString {
    fn from(message: MessageDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "message".cyan(),
            message.name().green()
        ));

        for field in message.fields() {
            let type_name = kind_name(&field.kind());

            if field.is_map() {
                out.push_str(&format!(
                    "  // map entry: {} {} = {};\n",
                    type_name,
                    field.name(),
                    field.number()
                ));
            } else {
                let label = if field.is_list() {
                    format!("{} ", "repeated".cyan())
                } else {
                    "".to_string()
                };
                out.push_str(&format!(
                    "  {}{} {} = {};\n",
                    label,
                    type_name,
                    field.name(),
                    field.number()
                ));
            }
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<EnumDescriptor> for FormattedString {
    fn from(enum_desc: EnumDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "enum".cyan(),
            enum_desc.name().green()
        ));

        for val in enum_desc.values() {
            out.push_str(&format!(
                "  {} = {};\n",
                val.name(),
                val.number().to_string().purple()
            ));
        }
        out.push('}');

        FormattedString(out)
    }
}
