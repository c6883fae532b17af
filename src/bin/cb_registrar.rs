// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Registrar process.
//
// Usage:
//   cb_registrar mailbox [--name <callback>]
//   cb_registrar socket  [--name <callback>] [--path <socket>]
//
// The mailbox variant writes the name and exits immediately, leaving the
// segment populated for a later invoker. The socket variant needs a
// listening invoker and prints its acknowledgement.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cbreg::{CallbackIdentity, Config, EndpointClient, Mailbox, Registrar};

#[derive(Parser, Debug)]
#[command(name = "cb_registrar")]
#[command(about = "Publish a callback name for an invoker process", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    transport: Transport,
}

#[derive(Subcommand, Debug)]
enum Transport {
    /// Write the name into the shared-memory mailbox
    Mailbox {
        /// Callback name to register
        #[arg(short, long, default_value = "my_callback_function")]
        name: String,
    },
    /// Send the name to a listening invoker and wait for its reply
    Socket {
        /// Callback name to register
        #[arg(short, long, default_value = "my_callback_function")]
        name: String,

        /// Socket path (overrides config)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let cfg = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match args.transport {
        Transport::Mailbox { name } => {
            let identity = CallbackIdentity::for_capacity(name, cfg.mailbox.capacity)
                .context("invalid callback name")?;
            let mailbox = Mailbox::open(&cfg.mailbox_key(), cfg.mailbox.capacity)?;
            let mut registrar = Registrar::new(mailbox);
            registrar.register(&identity)?;
            println!("Registered callback function: {identity}");
            registrar.into_inner().detach();
        }
        Transport::Socket { name, path } => {
            let identity = CallbackIdentity::new(name).context("invalid callback name")?;
            let path = path.unwrap_or(cfg.endpoint.path.clone());
            let client = EndpointClient::new(&path).with_limits(cfg.endpoint.max_frame, cfg.io_timeout());
            let mut registrar = Registrar::new(client);
            let registration = registrar
                .register(&identity)
                .with_context(|| format!("registering `{identity}` at {}", path.display()))?;
            if let Some(ack) = registration.acknowledgement {
                println!("Message from invoker: {ack}");
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::{Builder, Env};
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::from_env(Env::default().default_filter_or(level.as_str()))
        .format(|buf, record| {
            writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args())
        })
        .init();
}
