use once_cell::sync::OnceCell;

static INIT: OnceCell<()> = OnceCell::new();

pub const LOG_DIR: &str = "/var/log/ister";
pub const LOG_FILE: &str = "/var/log/ister/ister.log";

/// Install the global logger. Later calls are no-ops.
pub fn init() {
    INIT.get_or_init(|| {
        use env_logger::Target;
        use std::fs;
        use std::io;

        // stderr when the log directory is not writable.
        let target = (|| -> io::Result<Target> {
            fs::create_dir_all(LOG_DIR)?;
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(LOG_FILE)?;
            Ok(Target::Pipe(Box::new(file)))
        })()
        .unwrap_or(Target::Stderr);

        let _ = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .target(target)
            .try_init();
    });
}
