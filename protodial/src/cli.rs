//! # CLI
//!
//! This module defines the command-line interface of `protodial` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring fields
//! are `TAG=VALUE` and headers are `key:value`).
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "protodial", version, about = "Call gRPC methods from .proto sources")]
pub struct Cli {
    /// Directory scanned recursively for .proto files
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub proto_root: PathBuf,

    /// Extra import root for shared definitions (searched after the proto root)
    #[arg(short = 'I', long, global = true)]
    pub import_path: Option<PathBuf>,

    /// Load a compiled binary FileDescriptorSet instead of scanning the proto root
    #[arg(long, global = true)]
    pub file_descriptor_set: Option<PathBuf>,

    /// Directory names skipped while scanning (defaults to third_party)
    #[arg(long = "exclude", global = true)]
    pub excluded_dirs: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the services declared under the proto root
    Services,

    /// List the methods of a service and the input fields of its first method
    Methods {
        /// Fully qualified service name (e.g. my.package.Service)
        service: String,
    },

    /// Describe a service, message or enum
    Describe {
        /// Fully qualified symbol name (e.g. my.package.Message)
        symbol: String,
    },

    /// Perform a gRPC call to a server
    ///
    /// Builds the request from field tags and string values, then prints every response
    /// as it arrives. Ctrl-C cancels the call.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// protodial -p ./protos call localhost:50051 helloworld.Greeter/SayHello -f 1=world
    /// ```
    Call {
        /// Server address (host:port or http://host:port)
        host: String,

        /// Endpoint (package.Service/Method)
        #[arg(value_parser = parse_endpoint)]
        endpoint: (String, String),

        /// Request field as TAG=VALUE (repeatable)
        #[arg(short = 'f', long = "field", value_parser = parse_field)]
        fields: Vec<(u32, String)>,

        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Give up connecting after this many seconds
        #[arg(long, value_parser = parse_seconds)]
        connect_timeout: Option<Duration>,
    },
}

fn parse_endpoint(value: &str) -> Result<(String, String), String> {
    let (service, method) = value.split_once('/').ok_or_else(|| {
        format!("Invalid endpoint format: '{value}'. Expected 'package.Service/Method'",)
    })?;

    if service.trim().is_empty() || method.trim().is_empty() {
        return Err("Service and Method names cannot be empty".to_string());
    }

    Ok((service.to_string(), method.to_string()))
}

fn parse_field(value: &str) -> Result<(u32, String), String> {
    let (tag, raw) = value
        .split_once('=')
        .ok_or_else(|| "Format must be 'TAG=VALUE'".to_string())?;

    let tag = tag
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|tag| *tag > 0)
        .ok_or_else(|| format!("Invalid field tag '{tag}', expected a positive integer"))?;

    Ok((tag, raw.to_string()))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| format!("Invalid timeout '{value}', expected a positive number of seconds"))
}
