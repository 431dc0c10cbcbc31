//! # Protodial CLI Entry Point
//!
//! The main executable for the Protodial tool. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and sets up logging.
//! 2. **Loading**: Resolves the proto tree (or a compiled descriptor set) into a [`Session`].
//! 3. **Execution**: Lists, describes or calls through the session.
//! 4. **Presentation**: Formats and prints the resulting data or error to standard output/error.

mod cli;
mod formatter;

use clap::Parser;
use cli::{Cli, Commands};
use formatter::{FormattedString, GenericError, ResponseBlock, ServiceList};
use protodial_core::{
    invoker::{InvocationError, InvokeOptions},
    resolver::{ProtoDescriptorSet, ResolverConfig},
    session::{OutputSink, SendError, Session},
    tokio_util::sync::CancellationToken,
};
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let session = load_or_exit(&args);

    match args.command {
        Commands::Services => {
            let services = session
                .catalog()
                .map(|catalog| catalog.services().to_vec())
                .unwrap_or_default();
            println!("{}", FormattedString::from(ServiceList(services)));
        }
        Commands::Methods { service } => {
            println!("{}", FormattedString::from(session.service_selected(&service)));
        }
        Commands::Describe { symbol } => describe(&session, &symbol),
        Commands::Call {
            host,
            endpoint,
            fields,
            headers,
            connect_timeout,
        } => {
            let (service, method) = endpoint;
            let options = InvokeOptions {
                connect_timeout,
                headers,
            };
            run_call(&session, &host, &service, &method, &fields, &options).await;
        }
    }
}

/// Logs go to stderr so responses on stdout stay machine readable.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

fn load_or_exit(args: &Cli) -> Session {
    let mut config = ResolverConfig::default();
    if !args.excluded_dirs.is_empty() {
        config.excluded_dirs = args.excluded_dirs.clone();
    }
    let session = Session::with_resolver_config(config);

    let result = match &args.file_descriptor_set {
        Some(path) => load_descriptor_set(&session, path),
        None => session
            .process_protos(args.import_path.as_deref(), &args.proto_root)
            .map(|_| ())
            .map_err(FormattedString::from),
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
    session
}

fn load_descriptor_set(session: &Session, path: &std::path::Path) -> Result<(), FormattedString> {
    let bytes = std::fs::read(path)
        .map_err(|err| FormattedString::from(GenericError("Failed to read file", err)))?;
    let set = ProtoDescriptorSet::decode(&bytes).map_err(|err| {
        FormattedString::from(GenericError("Failed to parse file descriptor", err))
    })?;

    session.publish(set);
    Ok(())
}

fn describe(session: &Session, symbol: &str) {
    let descriptor = session
        .catalog()
        .and_then(|catalog| catalog.get_descriptor_by_symbol(symbol));

    match descriptor {
        Some(descriptor) => println!("{}", FormattedString::from(descriptor)),
        None => {
            eprintln!(
                "{}",
                FormattedString::from(GenericError("Symbol Lookup Failed", symbol))
            );
            process::exit(1);
        }
    }
}

/// Prints every response block the moment it is appended.
struct StdoutSink;

impl OutputSink for StdoutSink {
    fn reset(&mut self) {}

    fn append(&mut self, block: String) {
        println!("{}", FormattedString::from(ResponseBlock(block)));
    }
}

async fn run_call(
    session: &Session,
    host: &str,
    service: &str,
    method: &str,
    fields: &[(u32, String)],
    options: &InvokeOptions,
) {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received, cancelling call");
            on_interrupt.cancel();
        }
    });

    let result = session
        .send(
            host,
            service,
            method,
            fields,
            &mut StdoutSink,
            options,
            &cancel,
        )
        .await;

    match result {
        Ok(report) => tracing::debug!(blocks = report.blocks, "Call finished"),
        Err(err) => {
            let cancelled = matches!(
                err,
                SendError::Invocation(InvocationError::Cancelled)
                    | SendError::Interrupted {
                        source: InvocationError::Cancelled,
                        ..
                    }
            );
            eprintln!("{}", FormattedString::from(err));
            process::exit(if cancelled { 130 } else { 1 });
        }
    }
}
