//! `rbld`: the authoritative RBL/DNSBL UDP DNS server. Thin `main` wiring
//! config parsing, the privileged-then-dropped startup sequence (§6/§9.6),
//! and the event loop (§4.6) — the substance lives in `rbldlib`.
use log::{error, info};

use rbldlib::config::RunConfig;
use rbldlib::error::DNSResult;
use rbldlib::eventloop::{self, EventLoop};
use rbldlib::loader::Loader;
use rbldlib::zone::ZoneRegistry;

fn main() {
    if let Err(e) = run() {
        eprintln!("rbld: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &RunConfig) {
    let default_level = if config.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn run() -> DNSResult<()> {
    let config = RunConfig::from_args()?;
    init_logging(&config);
    info!("rbld starting, binding {}", config.bind_addr);

    // Bind while still privileged: a port below 1024 needs it, and that
    // privilege is given up a few steps from now.
    let socket = eventloop::bind_socket(config.bind_addr)?;

    let loader = Loader::new(config.zonespecs.clone(), config.accept_in_cidr, config.ttl);

    // Load before forking/dropping privileges unless quickstart asked for
    // a fast fork, in which case the (potentially slow, or fallible) load
    // happens in the child instead (§6, §7).
    let mut registry = if config.quickstart {
        ZoneRegistry::new()
    } else {
        loader.build()?
    };

    #[cfg(unix)]
    {
        if !config.foreground {
            rbldlib::privdrop::daemonize()?;
        }
        if let Some(dir) = &config.chroot_dir {
            rbldlib::privdrop::chroot(dir)?;
        }
        if let Some(dir) = &config.workdir {
            rbldlib::privdrop::chdir(dir)?;
        }
        if let Some(user) = &config.user {
            rbldlib::privdrop::drop_privileges(user)?;
        }
    }

    if config.quickstart {
        // This runs in the already-daemonized/detached process, with the
        // parent long since exited: a load failure here has no shell left
        // to report to, so it's logged and swallowed rather than
        // propagated, leaving the server up with an empty registry (§7).
        registry = match loader.build() {
            Ok(registry) => registry,
            Err(e) => {
                error!("quickstart zone load failed, starting with an empty registry: {}", e);
                ZoneRegistry::new()
            }
        };
    }

    #[cfg(unix)]
    if let Some(pidfile) = &config.pidfile {
        rbldlib::privdrop::write_pidfile(pidfile)?;
    }

    info!(
        "{} zone(s) loaded, serving on {}",
        registry.len(),
        config.bind_addr
    );

    let mut event_loop = EventLoop::new(config, loader, registry, socket)?;
    event_loop.run()
}
