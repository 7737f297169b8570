mod channel;
mod config;
mod dispatch;
mod listener;

use std::fs::File;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use nix::sys::signal::Signal;

use flowgraph_core::data::permission::{default_allow, read_only_policy, same_uid_sandbox, PermissionFn};
use flowgraph_core::Core;
use flowgraph_loop::{EventFd, Loop, SignalSource, Timer};

use config::{Config, PermissionPolicy};
use listener::Listener;

fn init_logging(level: log::LevelFilter, runtime_dir: &std::path::Path) {
    use simplelog::*;

    let log_path = runtime_dir.join("flowgraph-serverd.log");
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let log_file = File::create(&log_path).unwrap_or_else(|_| File::create("/tmp/flowgraph-serverd.log").expect("cannot create log file"));

    WriteLogger::init(level, simplelog::Config::default(), log_file).expect("failed to initialize logger");
    info!("flowgraph-serverd starting (log level: {level:?})");
}

fn permission_fn_for(policy: PermissionPolicy) -> PermissionFn {
    match policy {
        PermissionPolicy::DefaultAllow => Box::new(default_allow),
        PermissionPolicy::SameUid => Box::new(same_uid_sandbox),
        PermissionPolicy::ReadOnly => Box::new(read_only_policy),
    }
}

/// Flags the parent of `--config`/`--runtime-dir` in `args`, mirroring
/// imbolc-ui's flat `env::args()` scan rather than pulling in a CLI parsing
/// crate neither teacher program links.
struct Cli {
    verbose: bool,
    config_path: Option<std::path::PathBuf>,
    runtime_dir: Option<std::path::PathBuf>,
}

fn parse_cli() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(std::path::PathBuf::from);
    let runtime_dir = args
        .iter()
        .position(|a| a == "--runtime-dir")
        .and_then(|i| args.get(i + 1))
        .map(std::path::PathBuf::from);
    Cli { verbose, config_path, runtime_dir }
}

fn main() -> std::io::Result<()> {
    let cli = parse_cli();
    let config = Config::load(cli.config_path.as_ref());
    let runtime_dir = cli.runtime_dir.clone().unwrap_or_else(config::runtime_dir);
    let log_level = if cli.verbose { log::LevelFilter::Debug } else { config.log_level() };
    init_logging(log_level, &runtime_dir);

    SignalSource::block(&[Signal::SIGINT, Signal::SIGTERM])?;
    let mut signals = SignalSource::new(&[Signal::SIGINT, Signal::SIGTERM])?;

    let wake = Arc::new(EventFd::new()?);
    let (writer_tx, writer_rx) = mpsc::channel();
    let (action_tx, action_rx) = mpsc::channel();
    let (disconnect_tx, disconnect_rx) = mpsc::channel();

    std::thread::spawn(move || listener::writer_thread(writer_rx));

    let socket_path = runtime_dir.join(config.socket_name());
    let mut listener = Listener::bind(&socket_path, writer_tx, action_tx, disconnect_tx, Arc::clone(&wake))?;
    info!("listening on {}", socket_path.display());

    let mut core = Core::with_permission_fn(permission_fn_for(config.permission_policy()));

    let cycle_interval = Duration::from_millis(config.cycle_interval_ms());
    let timer = Timer::new()?;
    timer.arm(cycle_interval, cycle_interval)?;

    let mut reactor = Loop::new()?;
    // Every registration below is a no-op callback: the reactor only earns
    // its keep here as a multi-source sleep (wake the instant any of
    // listener/action/timer/signal is ready instead of polling on a fixed
    // interval), the actual handling happens in the loop body so it can
    // freely borrow `core` and `listener` without a shared-ownership wrapper.
    reactor.add_fd(&listener.as_fd(), || {})?;
    reactor.add_fd(wake.as_ref(), || {})?;
    reactor.add_fd(&timer.as_fd(), || {})?;
    reactor.add_fd(&signals.as_fd(), || {})?;

    let mut running = true;
    let start = Instant::now();

    while running {
        reactor.run_once(Some(cycle_interval))?;

        if let Ok(Some(info)) = signals.read_signal() {
            info!("received signal {}, shutting down", info.ssi_signo);
            running = false;
        }

        listener.accept_connections(&mut core);

        let _ = wake.read();
        while let Ok((client_id, msg)) = action_rx.try_recv() {
            for reply in dispatch::handle(&mut core, client_id, msg) {
                listener.send_to(client_id, &reply);
            }
        }
        while let Ok((conn, client_id)) = disconnect_rx.try_recv() {
            core.remove_client(client_id);
            listener.forget(conn, client_id);
        }

        let ticks = timer.read_expirations().unwrap_or(0);
        if ticks > 1 {
            warn!("missed {} graph cycle tick(s)", ticks - 1);
        }
        if ticks > 0 {
            let now_nsec = start.elapsed().as_nanos() as u64;
            for report in core.run_cycle(config.quantum(), config.sample_rate(), now_nsec) {
                if report.xrun {
                    warn!("cycle xrun among nodes {:?}", report.ran);
                }
            }
        }
    }

    info!("flowgraph-serverd stopped");
    Ok(())
}
