//! Size-triggered rolling file writer: writes land in
//! `<directory>/<prefix><N>.txt`, truncated on each roll, with `N` starting
//! at 1 and incrementing every time the roll size is exceeded.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::log::level::Severity;
use crate::log::logger::LoggerConfig;

pub(super) struct FileWriter {
    directory: PathBuf,
    file_prefix: String,
    roll_size_bytes: u64,
    file_number: u32,
    bytes_written: u64,
    file: BufWriter<File>,
}

impl FileWriter {
    pub(super) fn new(config: &LoggerConfig) -> io::Result<FileWriter> {
        std::fs::create_dir_all(&config.directory)?;
        let mut writer = FileWriter {
            directory: config.directory.clone(),
            file_prefix: config.file_prefix.clone(),
            roll_size_bytes: config.roll_size_mb * 1024 * 1024,
            file_number: 0,
            bytes_written: 0,
            file: BufWriter::new(open_roll(&config.directory, &config.file_prefix, 1)?),
        };
        writer.file_number = 1;
        Ok(writer)
    }

    pub(super) fn write(&mut self, line: &str, level: Severity) -> io::Result<()> {
        self.file.write_all(line.as_bytes())?;
        self.bytes_written += line.len() as u64;
        if level == Severity::Crit {
            self.file.flush()?;
        }
        if self.bytes_written > self.roll_size_bytes {
            self.roll_file()?;
        }
        Ok(())
    }

    fn roll_file(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file_number += 1;
        self.file = BufWriter::new(open_roll(&self.directory, &self.file_prefix, self.file_number)?);
        self.bytes_written = 0;
        Ok(())
    }
}

fn open_roll(directory: &std::path::Path, prefix: &str, number: u32) -> io::Result<File> {
    let path = directory.join(format!("{prefix}{number}.txt"));
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}
