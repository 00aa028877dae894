/// Allocates nation, war and trade ids from one counter, so an id never
/// names two different records even across tables.
///
/// At startup the generator resumes after the highest id found in the store.
#[derive(Debug)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Resume after `highest`, the largest id already in use (0 for none).
    pub fn resume_after(highest: u64) -> Self {
        Self {
            next: highest.saturating_add(1).max(1),
        }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Make sure ids handed out later are greater than `seen`.
    pub fn observe(&mut self, seen: u64) {
        if seen >= self.next {
            self.next = seen + 1;
        }
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
