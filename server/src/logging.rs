//! Logger setup for the server binary
//!
//! Records are written as `LEVEL: timestamp: message`. Without a log
//! directory they go to stderr; with one they are appended to
//! `chatServer_<date>.log` inside it. `RUST_LOG` still overrides the level.

use chrono::Local;
use env_logger::{Builder, Env, Target};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Log file used for a server started today
pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("chatServer_{}.log", Local::now().format("%Y-%m-%d")))
}

pub fn init(log_dir: Option<&Path>) -> io::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{}: {}: {}",
            record.level(),
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.args()
        )
    });

    if let Some(dir) = log_dir {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path(dir))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_carries_date() {
        let path = log_file_path(Path::new("/var/log/chat"));
        let name = path.file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("chatServer_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "chatServer_YYYY-MM-DD.log".len());
    }
}
