use std::{
    collections::VecDeque,
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;

/// Removes ANSI escape sequences so colour codes never reach the log file.
pub fn strip_ansi_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        // Skip until the terminating letter of the sequence.
        for next in chars.by_ref() {
            if next.is_ascii_alphabetic() {
                break;
            }
        }
    }
    out
}

/// Append-only log file that keeps at most `max_lines` lines.
///
/// Trimming rewrites the file from the tail and only runs every
/// `max_lines / 10` (min 50) appended lines, so the common path is a plain
/// append.
#[derive(Clone)]
pub(crate) struct RollingLogFile {
    path: PathBuf,
    max_lines: usize,
    pending: Arc<Mutex<usize>>,
}

impl RollingLogFile {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            path: path.into(),
            max_lines: max_lines.max(1),
            pending: Arc::new(Mutex::new(0)),
        }
    }

    fn trim_interval(&self) -> usize {
        (self.max_lines / 10).max(50)
    }

    fn trim(&self) -> io::Result<()> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut tail: VecDeque<String> = VecDeque::with_capacity(self.max_lines + 1);
        let mut total = 0usize;
        for line in BufReader::new(file).lines() {
            tail.push_back(line?);
            total += 1;
            if tail.len() > self.max_lines {
                tail.pop_front();
            }
        }

        if total > self.max_lines {
            let mut file = File::create(&self.path)?;
            for line in &tail {
                writeln!(file, "{}", line)?;
            }
        }
        Ok(())
    }
}

impl io::Write for RollingLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf)?;

        let mut pending = self.pending.lock();
        *pending += buf.iter().filter(|&&b| b == b'\n').count();
        if *pending >= self.trim_interval() {
            if let Err(e) = self.trim() {
                eprintln!("Failed to trim log file {}: {}", self.path.display(), e);
            }
            *pending = 0;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RollingLogFile {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_escapes() {
        assert_eq!(strip_ansi_escapes("\x1b[31mred\x1b[0m plain"), "red plain");
        assert_eq!(strip_ansi_escapes("no codes"), "no codes");
    }

    #[test]
    fn test_trim_keeps_tail() {
        let path = std::env::temp_dir().join(format!("saybot-log-{}.log", uuid::Uuid::new_v4()));
        let mut log = RollingLogFile::new(&path, 60);

        for i in 0..120 {
            log.write_all(format!("line {}\n", i).as_bytes()).unwrap();
        }
        log.trim().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 60);
        assert_eq!(lines.first(), Some(&"line 60"));
        assert_eq!(lines.last(), Some(&"line 119"));

        let _ = std::fs::remove_file(&path);
    }
}
