//! Aggregate progress over a known amount of work.

/// Percentage meter that never goes backwards and never passes 100.
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    total: usize,
    done: usize,
    last_percent: u8,
}

impl ProgressMeter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: 0,
            last_percent: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn done(&self) -> usize {
        self.done
    }

    /// Mark `n` more units complete and return the new percentage.
    pub fn advance(&mut self, n: usize) -> u8 {
        self.done = (self.done + n).min(self.total);
        let percent = if self.total == 0 {
            100
        } else {
            ((self.done * 100) / self.total) as u8
        };
        self.last_percent = self.last_percent.max(percent.min(100));
        self.last_percent
    }

    pub fn percent(&self) -> u8 {
        self.last_percent
    }

    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}
