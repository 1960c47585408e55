use chrono::NaiveDateTime;

/// Issues MSH-10 message control ids.
///
/// Ids are `<yyyyMMddHHmmss><sequence:04>`. The sequence belongs to this counter, so separate
/// producers never share state; it wraps after 9999.
#[derive(Clone, Debug, Default)]
pub struct ControlIdCounter {
    next: u16,
}

impl ControlIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the sequence at `start` (taken modulo 10000).
    pub fn starting_at(start: u16) -> Self {
        Self {
            next: start % 10_000,
        }
    }

    pub fn next_id(&mut self, now: NaiveDateTime) -> String {
        let seq = self.next;
        self.next = (self.next + 1) % 10_000;
        format!("{}{seq:04}", now.format("%Y%m%d%H%M%S"))
    }
}
