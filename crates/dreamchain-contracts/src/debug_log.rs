use std::collections::VecDeque;

use chrono::Local;

pub const DEBUG_LOG_CAPACITY: usize = 50;

/// Sliding window of timestamped log lines. Oldest lines are evicted
/// first once the window is full.
#[derive(Debug, Clone)]
pub struct DebugLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::with_capacity(DEBUG_LOG_CAPACITY)
    }
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Stamps `message` with the local wall-clock time, appends it and
    /// returns the stored line.
    pub fn append(&mut self, message: &str) -> String {
        let line = format!("[{}] {message}", Local::now().format("%H:%M:%S"));
        self.push_line(line.clone());
        line
    }

    fn push_line(&mut self, line: String) {
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{DebugLog, DEBUG_LOG_CAPACITY};

    #[test]
    fn append_prefixes_clock_time() {
        let mut log = DebugLog::new();
        let line = log.append("Loop stopped.");
        assert!(line.starts_with('['));
        assert!(line.ends_with("] Loop stopped."));
        // "[HH:MM:SS] "
        assert_eq!(line.find(']'), Some(9));
    }

    #[test]
    fn keeps_only_the_last_fifty_lines() {
        let mut log = DebugLog::new();
        for idx in 0..60 {
            log.append(&format!("line {idx}"));
        }
        assert_eq!(log.len(), DEBUG_LOG_CAPACITY);

        let lines = log.snapshot();
        assert!(lines[0].ends_with("line 10"));
        assert!(lines[49].ends_with("line 59"));
        for (offset, line) in lines.iter().enumerate() {
            assert!(line.ends_with(&format!("line {}", offset + 10)));
        }
    }

    #[test]
    fn never_exceeds_capacity_while_filling() {
        let mut log = DebugLog::with_capacity(3);
        for idx in 0..10 {
            log.append(&idx.to_string());
            assert!(log.len() <= 3);
        }
        let tail: Vec<&str> = log.lines().collect();
        assert!(tail[0].ends_with(" 7"));
        assert!(tail[2].ends_with(" 9"));
    }

    #[test]
    fn clear_empties_the_window() {
        let mut log = DebugLog::new();
        log.append("one");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.capacity(), DEBUG_LOG_CAPACITY);
    }
}
