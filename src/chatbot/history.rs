//! Bounded conversation history sent to the model as context.

use crate::openai::Record;

/// Ordered records for one conversation; oldest first.
#[derive(Debug, Clone, Default)]
pub struct History {
    records: Vec<Record>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Keep only the `max_length` most recent records.
    pub fn trim_to(&mut self, max_length: usize) {
        let excess = self.records.len().saturating_sub(max_length);
        if excess > 0 {
            self.records.drain(..excess);
        }
    }

    /// Drop tool results at the front whose assistant tool-call turn was trimmed away.
    pub fn drop_orphaned_tool_results(&mut self) {
        let orphans = self.records.iter().take_while(|r| r.is_tool_result()).count();
        if orphans > 0 {
            self.records.drain(..orphans);
        }
    }

    /// Drop everything after the first `len` records.
    pub fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The suffix of at most `max_length` most recent records.
pub fn trim(records: &[Record], max_length: usize) -> &[Record] {
    &records[records.len().saturating_sub(max_length)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<Record> {
        (0..n).map(|i| Record::user(format!("msg {i}"))).collect()
    }

    #[test]
    fn test_trim_keeps_most_recent() {
        let records = numbered(25);
        let trimmed = trim(&records, 20);
        assert_eq!(trimmed.len(), 20);
        assert_eq!(trimmed, &records[5..]);
        assert_eq!(trimmed[0], Record::user("msg 5"));
        assert_eq!(trimmed[19], Record::user("msg 24"));
    }

    #[test]
    fn test_trim_shorter_than_max() {
        let records = numbered(3);
        assert_eq!(trim(&records, 20), &records[..]);
        assert!(trim(&records, 0).is_empty());
        assert!(trim(&[], 5).is_empty());
    }

    #[test]
    fn test_trim_every_length() {
        for len in 0..12 {
            let records = numbered(len);
            for max in 0..12 {
                let trimmed = trim(&records, max);
                assert_eq!(trimmed.len(), len.min(max));
                assert_eq!(trimmed, &records[len - len.min(max)..]);
            }
        }
    }

    #[test]
    fn test_history_trim_to_matches_trim() {
        let mut history = History::new();
        for record in numbered(25) {
            history.append(record);
        }
        let expected = trim(history.records(), 20).to_vec();
        history.trim_to(20);
        assert_eq!(history.len(), 20);
        assert_eq!(history.records(), &expected[..]);
    }

    #[test]
    fn test_drop_orphaned_tool_results() {
        let mut history = History::new();
        history.append(Record::Tool {
            tool_call_id: "a".to_string(),
            name: "create_voice_message".to_string(),
            content: "x".to_string(),
        });
        history.append(Record::Tool {
            tool_call_id: "b".to_string(),
            name: "create_voice_message".to_string(),
            content: "x".to_string(),
        });
        history.append(Record::system("sys"));
        history.append(Record::user("hi"));

        history.drop_orphaned_tool_results();
        assert_eq!(history.records(), &[Record::system("sys"), Record::user("hi")]);

        // Nothing further to drop.
        history.drop_orphaned_tool_results();
        assert_eq!(history.len(), 2);
    }
}
