//! Parser for the RFC822-style control blocks emitted by `apt-cache show`.
//!
//! The grammar is deliberately loose: blocks are separated by blank lines,
//! each field is `Key: value` on one line, continuation lines (leading
//! whitespace) belong to the previous field's long value and are skipped
//! because no field we consume spans lines, and lines without a colon carry
//! no key. Unknown keys are kept verbatim so callers decide what matters.

/// One parsed control block, preserving field order and duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlBlock {
    fields: Vec<(String, String)>,
}

impl ControlBlock {
    /// First value recorded for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Lazily iterate the control blocks in `input`.
///
/// A trailing block not terminated by a blank line is still yielded, and
/// runs of blank lines never produce empty blocks.
pub fn blocks(input: &str) -> Blocks<'_> {
    Blocks {
        lines: input.lines(),
    }
}

pub struct Blocks<'a> {
    lines: std::str::Lines<'a>,
}

impl Iterator for Blocks<'_> {
    type Item = ControlBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let mut block = ControlBlock::default();
        for line in self.lines.by_ref() {
            if line.trim().is_empty() {
                if block.fields.is_empty() {
                    continue;
                }
                return Some(block);
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                block
                    .fields
                    .push((key.trim().to_owned(), value.trim().to_owned()));
            }
        }
        if block.fields.is_empty() {
            None
        } else {
            Some(block)
        }
    }
}
