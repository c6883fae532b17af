// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Invoker process.
//
// Usage:
//   cb_invoker mailbox [--keep] [--interval-ms <ms>]
//   cb_invoker socket  [--path <socket>] [--serve <n>]
//
// Waits for a registrar, loads the unit (default ./libcallback.so), calls
// the exported routine named by the registration, then releases the
// channel. SIGINT/SIGTERM end a blocked wait.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::warn;

use cbreg::{
    CancelToken, Config, Discover, EndpointDiscovery, EndpointListener, Invoker, Mailbox,
    MailboxDiscovery, Outcome, UnitPool,
};

#[derive(Parser, Debug)]
#[command(name = "cb_invoker")]
#[command(about = "Wait for a callback registration and invoke it", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Loadable unit exporting the callbacks (overrides config)
    #[arg(short, long, value_name = "FILE", global = true)]
    unit: Option<PathBuf>,

    /// Give up after waiting this long for a registration
    #[arg(long, value_name = "MS", global = true)]
    timeout_ms: Option<u64>,

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
    /// Poll the shared-memory mailbox
    Mailbox {
        /// Leave the name in the mailbox after reading it
        #[arg(long)]
        keep: bool,

        /// Poll interval (overrides config)
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
    },
    /// Listen on a Unix domain socket
    Socket {
        /// Socket path (overrides config)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,

        /// Handle this many registrations before exiting (0 = until interrupted)
        #[arg(long, value_name = "N", default_value_t = 1)]
        serve: usize,
    },
}

static SIGNALLED: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);
    install_signal_flag();

    let mut cfg = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(unit) = args.unit {
        cfg.unit.path = unit;
    }
    if args.timeout_ms.is_some() {
        cfg.wait_timeout_ms = args.timeout_ms;
    }

    let pool = UnitPool::new(&cfg.unit.path);
    let cancel = CancelToken::linked_to(&SIGNALLED);

    match args.transport {
        Transport::Mailbox { keep, interval_ms } => {
            if let Some(ms) = interval_ms {
                cfg.mailbox.poll_interval_ms = ms;
            }
            if keep {
                cfg.mailbox.consume = false;
            }
            cfg.validate()?;
            let mailbox = Mailbox::open(&cfg.mailbox_key(), cfg.mailbox.capacity)?;
            let discovery = MailboxDiscovery::new(mailbox, cfg.poll_interval())
                .with_timeout(cfg.wait_timeout())
                .consume(cfg.mailbox.consume);
            println!("Invoker is waiting for callback registration...");
            run_single(Invoker::with_cancel(discovery, pool, cancel))
        }
        Transport::Socket { path, serve } => {
            if let Some(p) = path {
                cfg.endpoint.path = p;
            }
            cfg.validate()?;
            let listener =
                EndpointListener::bind(&cfg.endpoint.path, cfg.endpoint.max_frame, cfg.io_timeout())?;
            let discovery = EndpointDiscovery::new(listener).with_timeout(cfg.wait_timeout());
            println!("Invoker is listening on {}", cfg.endpoint.path.display());
            if serve == 1 {
                return run_single(Invoker::with_cancel(discovery, pool, cancel));
            }
            let mut invoker = Invoker::with_cancel(discovery, pool, cancel);
            let served = invoker.serve((serve > 0).then_some(serve));
            invoker.finish()?;
            let summary = served?;
            println!(
                "Handled {} registration(s): {} invoked, {} failed, {} dropped",
                summary.invoked + summary.failed + summary.dropped,
                summary.invoked,
                summary.failed,
                summary.dropped
            );
            if summary.failed > 0 {
                bail!("{} callback(s) could not be resolved", summary.failed);
            }
            Ok(())
        }
    }
}

/// One attempt, then release the channel whatever happened.
fn run_single<D: Discover>(mut invoker: Invoker<D, UnitPool>) -> Result<()> {
    let result = invoker.run_once();
    if let Err(e) = invoker.finish() {
        warn!("release failed: {e}");
    }
    match result? {
        Outcome::Invoked(id) => {
            println!("Called the registered callback function: {id}");
            Ok(())
        }
        Outcome::ResolutionFailed { identity, error } => {
            bail!("could not invoke `{identity}`: {error}")
        }
    }
}

// Sets a flag on SIGINT / SIGTERM / SIGHUP. The handler only touches an
// atomic; the waiting side polls it through the cancel token.
fn install_signal_flag() {
    extern "C" fn handler(_: libc::c_int) {
        SIGNALLED.store(true, Ordering::Release);
    }
    unsafe {
        libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGHUP, handler as *const () as libc::sighandler_t);
    }
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
