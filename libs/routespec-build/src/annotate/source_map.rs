use std::ops::Range;

/// One splice, expressed in both original and generated byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedEdit {
    pub original: Range<usize>,
    pub generated: Range<usize>,
}

/// Offset mapping between annotated output and the source it came from.
///
/// Edits are kept in ascending order and never overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    edits: Vec<MappedEdit>,
}

impl SourceMap {
    pub(crate) fn new(edits: Vec<MappedEdit>) -> Self {
        Self { edits }
    }

    pub fn edits(&self) -> &[MappedEdit] {
        &self.edits
    }

    pub fn is_identity(&self) -> bool {
        self.edits.is_empty()
    }

    /// Maps a generated offset back to the original source.
    ///
    /// Offsets that fall inside injected text map to the start of the edit.
    pub fn original_offset(&self, generated: usize) -> usize {
        let mut mapped = generated;
        for edit in &self.edits {
            if generated < edit.generated.start {
                break;
            }
            if generated < edit.generated.end {
                return edit.original.start;
            }
            mapped = generated - edit.generated.end + edit.original.end;
        }
        mapped
    }
}
