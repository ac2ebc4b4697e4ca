use std::panic;
use std::sync::Once;

static INIT: Once = Once::new();

/// Install the platform logger and the panic hook. Safe to call more than once.
pub fn init_logging() {
    INIT.call_once(|| {
        #[cfg(target_os = "android")]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Debug)
                    .with_tag("BrownieEngine"),
            );
        }

        #[cfg(target_os = "ios")]
        {
            let _ = oslog::OsLogger::new("com.sempers.brownie")
                .level_filter(log::LevelFilter::Debug)
                .init();
        }

        #[cfg(not(any(target_os = "android", target_os = "ios")))]
        {
            // `log` records are forwarded into the subscriber; RUST_LOG overrides the level.
            let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .try_init();
        }

        set_panic_hook();

        log::debug!("logging initialized");
    });
}

fn set_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Box<Any>"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let thread = std::thread::current();
        let bt = backtrace::Backtrace::new();

        log::error!(
            "panic on thread '{}'\nMessage: {}\nLocation: {}\nBacktrace:\n{:?}",
            thread.name().unwrap_or("<unnamed>"),
            msg,
            location,
            bt
        );

        default_hook(panic_info);
    }));
}
