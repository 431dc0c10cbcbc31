//! # Dynamic Message Builder
//!
//! Builds a `prost_reflect::DynamicMessage` for an arbitrary input type from
//! `(field tag, string value)` pairs.
//!
//! Only scalar fields accept values. Every scalar kind is coerced through [`ScalarKind`],
//! a closed set with one parse/format pair per kind. Message, enum, repeated and map fields
//! are still reported by [`FieldKind::of`] so callers can display the full input shape, but
//! entering a value for them fails with [`BuildError::UnsupportedField`].
use prost::bytes::Bytes;
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, ReflectMessage, Value,
};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Message '{message}' has no field with tag {tag}")]
    UnknownFieldTag { message: String, tag: u32 },
    #[error("Cannot coerce '{raw}' into {kind} for field {tag}")]
    FieldCoercion {
        tag: u32,
        raw: String,
        kind: ScalarKind,
    },
    #[error("Field {tag} ('{name}') of type '{type_name}' cannot be set from text")]
    UnsupportedField {
        tag: u32,
        name: String,
        type_name: String,
    },
}

/// The scalar kinds that can be entered as text.
///
/// Protobuf encoding variants collapse onto the scalar they carry: `sint32` and `sfixed32`
/// coerce as [`ScalarKind::Int32`], `fixed64` as [`ScalarKind::Uint64`], and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
}

impl ScalarKind {
    /// Maps a declared protobuf kind onto its scalar, `None` for messages and enums.
    pub fn from_kind(kind: &Kind) -> Option<Self> {
        let scalar = match kind {
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Self::Int32,
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Self::Int64,
            Kind::Uint32 | Kind::Fixed32 => Self::Uint32,
            Kind::Uint64 | Kind::Fixed64 => Self::Uint64,
            Kind::Float => Self::Float,
            Kind::Double => Self::Double,
            Kind::Bool => Self::Bool,
            Kind::String => Self::String,
            Kind::Bytes => Self::Bytes,
            Kind::Message(_) | Kind::Enum(_) => return None,
        };
        Some(scalar)
    }

    /// Parses `raw` into a value of this kind.
    ///
    /// Numbers are read as base-10 (surrounding whitespace is ignored). Booleans accept
    /// `true`/`false`, `t`/`f` and `1`/`0` in any case. Strings and bytes are taken verbatim.
    pub fn parse(self, raw: &str) -> Option<Value> {
        let trimmed = raw.trim();
        let value = match self {
            Self::Int32 => Value::I32(trimmed.parse().ok()?),
            Self::Int64 => Value::I64(trimmed.parse().ok()?),
            Self::Uint32 => Value::U32(trimmed.parse().ok()?),
            Self::Uint64 => Value::U64(trimmed.parse().ok()?),
            Self::Float => Value::F32(trimmed.parse().ok()?),
            Self::Double => Value::F64(trimmed.parse().ok()?),
            Self::Bool => Value::Bool(parse_bool(trimmed)?),
            Self::String => Value::String(raw.to_string()),
            Self::Bytes => Value::Bytes(Bytes::copy_from_slice(raw.as_bytes())),
        };
        Some(value)
    }

    /// Formats a value of this kind back into text, `None` if the value is of another kind.
    pub fn format(self, value: &Value) -> Option<String> {
        let text = match (self, value) {
            (Self::Int32, Value::I32(v)) => v.to_string(),
            (Self::Int64, Value::I64(v)) => v.to_string(),
            (Self::Uint32, Value::U32(v)) => v.to_string(),
            (Self::Uint64, Value::U64(v)) => v.to_string(),
            (Self::Float, Value::F32(v)) => v.to_string(),
            (Self::Double, Value::F64(v)) => v.to_string(),
            (Self::Bool, Value::Bool(v)) => v.to_string(),
            (Self::String, Value::String(v)) => v.clone(),
            (Self::Bytes, Value::Bytes(v)) => String::from_utf8_lossy(v).into_owned(),
            _ => return None,
        };
        Some(text)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

/// How a field can be filled in by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    /// Listed for display only. Holds the declared type (e.g. `repeated string`).
    Unsupported(String),
}

impl FieldKind {
    pub fn of(field: &FieldDescriptor) -> Self {
        if field.is_map() {
            return Self::Unsupported(type_name(&field.kind()));
        }
        if field.is_list() {
            return Self::Unsupported(format!("repeated {}", type_name(&field.kind())));
        }
        match ScalarKind::from_kind(&field.kind()) {
            Some(scalar) => Self::Scalar(scalar),
            None => Self::Unsupported(type_name(&field.kind())),
        }
    }

    pub fn scalar(&self) -> Option<ScalarKind> {
        match self {
            Self::Scalar(scalar) => Some(*scalar),
            Self::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(scalar) => write!(f, "{scalar}"),
            Self::Unsupported(type_name) => f.write_str(type_name),
        }
    }
}

/// One entry of a message's input shape: the field label, its tag and how it can be filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputField {
    pub label: String,
    pub tag: u32,
    pub kind: FieldKind,
}

impl From<&FieldDescriptor> for InputField {
    fn from(field: &FieldDescriptor) -> Self {
        Self {
            label: field.name().to_string(),
            tag: field.number(),
            kind: FieldKind::of(field),
        }
    }
}

/// Lists the fields of `message` in declaration order.
///
/// `MessageDescriptor::fields` yields fields sorted by tag, so the order is taken from the
/// underlying `DescriptorProto` instead.
pub fn input_fields(message: &MessageDescriptor) -> Vec<InputField> {
    message
        .descriptor_proto()
        .field
        .iter()
        .filter_map(|proto| u32::try_from(proto.number()).ok())
        .filter_map(|tag| message.get_field(tag))
        .map(|field| InputField::from(&field))
        .collect()
}

/// Builds a message of type `input` from `(tag, value)` pairs.
///
/// Fields that are not mentioned stay unset. When a tag appears more than once, the last
/// value wins.
///
/// # Returns
///
/// * `Ok(DynamicMessage)` - Every pair was applied.
/// * `Err(BuildError)` - The first pair that could not be applied. No message is produced.
pub fn build<I, V>(input: &MessageDescriptor, values: I) -> Result<DynamicMessage, BuildError>
where
    I: IntoIterator<Item = (u32, V)>,
    V: AsRef<str>,
{
    let mut message = DynamicMessage::new(input.clone());

    for (tag, raw) in values {
        let raw = raw.as_ref();
        let field = input
            .get_field(tag)
            .ok_or_else(|| BuildError::UnknownFieldTag {
                message: input.full_name().to_string(),
                tag,
            })?;

        let scalar = match FieldKind::of(&field) {
            FieldKind::Scalar(scalar) => scalar,
            FieldKind::Unsupported(type_name) => {
                return Err(BuildError::UnsupportedField {
                    tag,
                    name: field.name().to_string(),
                    type_name,
                });
            }
        };

        let coercion_error = || BuildError::FieldCoercion {
            tag,
            raw: raw.to_string(),
            kind: scalar,
        };
        let value = scalar.parse(raw).ok_or_else(coercion_error)?;
        message
            .try_set_field(&field, value)
            .map_err(|_| coercion_error())?;
    }

    Ok(message)
}

/// Formats the current value of a scalar field back into text.
///
/// Unset fields read back as their default value. Returns `None` for unknown tags and
/// non-scalar fields.
pub fn read_back(message: &DynamicMessage, tag: u32) -> Option<String> {
    let field = message.descriptor().get_field(tag)?;
    let scalar = FieldKind::of(&field).scalar()?;
    scalar.format(&message.get_field(&field))
}

fn type_name(kind: &Kind) -> String {
    match kind {
        Kind::Message(m) => m.full_name().to_string(),
        Kind::Enum(e) => e.full_name().to_string(),
        Kind::Sint32 => "sint32".to_string(),
        Kind::Sint64 => "sint64".to_string(),
        Kind::Fixed32 => "fixed32".to_string(),
        Kind::Fixed64 => "fixed64".to_string(),
        Kind::Sfixed32 => "sfixed32".to_string(),
        Kind::Sfixed64 => "sfixed64".to_string(),
        scalar => ScalarKind::from_kind(scalar)
            .map(|s| s.name().to_string())
            .unwrap_or_default(),
    }
}
