use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

pub struct Logger {
    file: Mutex<File>,
    level: LevelFilter,
}

impl Logger {
    pub fn new(log_path: &Path, level: LevelFilter) -> Result<Self, std::io::Error> {
        if let Some(dir) = log_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Logger {
            file: Mutex::new(file),
            level,
        })
    }

    /// 写入日志文件；文件不可用时退回到标准错误输出
    pub fn init(log_path: &Path, level: &str) -> Result<(), Box<dyn std::error::Error>> {
        let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Debug);
        match Self::new(log_path, level) {
            Ok(logger) => {
                log::set_boxed_logger(Box::new(logger))?;
                log::set_max_level(level);
            }
            Err(e) => {
                eprintln!("无法打开日志文件 {}: {}，改用标准错误输出", log_path.display(), e);
                env_logger::Builder::new().filter_level(level).try_init()?;
            }
        }
        Ok(())
    }

    fn format(record: &Record) -> String {
        format!(
            "[{}] [{}] [{}:{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = Self::format(record);
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(entry.as_bytes());
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}
