//! Reassembly of per-chunk responses into one document.

use crate::error::{DocscribeError, Result};

/// Final document built from every chunk's response, in chunk order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedDocument {
    /// Response texts ordered by chunk index
    pub parts: Vec<String>,

    /// Parts joined with the aggregator's separator
    pub text: String,
}

/// Collects one response slot per chunk and refuses to finish with gaps
#[derive(Debug)]
pub struct Aggregator {
    slots: Vec<Option<String>>,
    separator: String,
}

impl Aggregator {
    /// Expect exactly `expected` responses, concatenated with no separator
    pub fn new(expected: usize) -> Self {
        Self {
            slots: vec![None; expected],
            separator: String::new(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Store the response for chunk `index`
    pub fn record(&mut self, index: usize, response: impl Into<String>) -> Result<()> {
        let expected = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            DocscribeError::Aggregation(format!(
                "Chunk index {} outside the {} expected chunk(s)",
                index, expected
            ))
        })?;

        if slot.is_some() {
            return Err(DocscribeError::Aggregation(format!(
                "Response for chunk {} recorded twice",
                index
            )));
        }

        *slot = Some(response.into());
        Ok(())
    }

    pub fn missing(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    /// Merge every slot in index order. Fails if any slot is still empty.
    pub fn finish(self) -> Result<AggregatedDocument> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(DocscribeError::IncompleteAggregation { missing });
        }

        let parts: Vec<String> = self.slots.into_iter().flatten().collect();
        let text = parts.join(&self.separator);

        Ok(AggregatedDocument { parts, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concatenates_in_index_order() {
        let mut aggregator = Aggregator::new(3);
        aggregator.record(2, "C").unwrap();
        aggregator.record(0, "A").unwrap();
        aggregator.record(1, "B").unwrap();

        let doc = aggregator.finish().unwrap();
        assert_eq!(doc.text, "ABC");
        assert_eq!(doc.parts, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_prefixes_match_running_concatenation() {
        let responses = ["fn a() {}\n", "fn b() {}\n", "fn c() {}\n", "fn d() {}\n"];
        let mut aggregator = Aggregator::new(responses.len());
        for (i, r) in responses.iter().enumerate() {
            aggregator.record(i, *r).unwrap();
        }
        let doc = aggregator.finish().unwrap();

        let mut prefix = String::new();
        for r in responses {
            prefix.push_str(r);
            assert!(doc.text.starts_with(&prefix));
        }
        assert_eq!(doc.text, prefix);
    }

    #[test]
    fn test_missing_chunk_is_incomplete() {
        let mut aggregator = Aggregator::new(4);
        aggregator.record(0, "A").unwrap();
        aggregator.record(2, "C").unwrap();

        match aggregator.finish() {
            Err(DocscribeError::IncompleteAggregation { missing }) => {
                assert_eq!(missing, vec![1, 3]);
            }
            other => panic!("expected IncompleteAggregation, got {:?}", other),
        }
    }

    #[test]
    fn test_separator_between_parts() {
        let mut aggregator = Aggregator::new(2).with_separator("\n\n");
        aggregator.record(0, "first").unwrap();
        aggregator.record(1, "second").unwrap();
        assert_eq!(aggregator.finish().unwrap().text, "first\n\nsecond");
    }

    #[test]
    fn test_rejects_duplicate_and_out_of_range() {
        let mut aggregator = Aggregator::new(1);
        aggregator.record(0, "A").unwrap();
        assert!(matches!(
            aggregator.record(0, "again"),
            Err(DocscribeError::Aggregation(_))
        ));
        assert!(matches!(
            aggregator.record(1, "B"),
            Err(DocscribeError::Aggregation(_))
        ));
    }
}
