//! UTF-8 decoding, cluster maps and direction/script run segmentation

use smallvec::SmallVec;
use tessera_paint::{SourceRange, TextDirection};

use crate::script::{strong_direction, Script};

/// Byte offset of every code point of a text, in order.
///
/// Maps byte offsets back to code point indices by binary search.
#[derive(Debug, Clone, Default)]
pub struct ClusterMap {
    offsets: Vec<usize>,
    chars: Vec<char>,
    len: usize,
}

impl ClusterMap {
    pub fn new(text: &str) -> Self {
        let (offsets, chars) = text.char_indices().unzip();
        Self {
            offsets,
            chars,
            len: text.len(),
        }
    }

    /// Number of code points
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Index of the code point containing byte `offset`
    pub fn codepoint_index(&self, offset: usize) -> Option<usize> {
        if offset >= self.len {
            return None;
        }
        Some(self.offsets.partition_point(|&b| b <= offset) - 1)
    }

    /// Byte offset at which code point `index` starts (text length past the end)
    pub fn byte_offset(&self, index: usize) -> usize {
        self.offsets.get(index).copied().unwrap_or(self.len)
    }

    /// Snap a byte offset down to the start of its code point
    pub fn snap(&self, offset: usize) -> usize {
        self.codepoint_index(offset)
            .map(|i| self.offsets[i])
            .unwrap_or(self.len)
    }

    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.codepoint_index(offset).map(|i| self.chars[i])
    }
}

/// A maximal span of text with a stable direction and script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRun {
    pub range: SourceRange,
    pub direction: TextDirection,
    pub script: Script,
}

pub type TextRuns = SmallVec<[TextRun; 4]>;

/// Split `text` into direction/script runs.
///
/// Neutral code points (whitespace, digits, punctuation) join the run before
/// them. Neutrals following a right-to-left run stay in it unless the next
/// strong code point is left-to-right, in which case they start the
/// left-to-right run instead. Leading neutrals take the first strong direction
/// and script that follow.
pub fn segment(text: &str, map: &ClusterMap) -> TextRuns {
    let mut runs = TextRuns::new();
    let chars = map.chars();
    if chars.is_empty() {
        return runs;
    }

    let directions: Vec<Option<TextDirection>> = chars.iter().map(|&c| strong_direction(c)).collect();
    let scripts: Vec<Script> = chars.iter().map(|&c| Script::of(c)).collect();

    // Next strong direction / concrete script at or after each index
    let mut next_direction = vec![None; chars.len() + 1];
    let mut next_script = vec![None; chars.len() + 1];
    for i in (0..chars.len()).rev() {
        next_direction[i] = directions[i].or(next_direction[i + 1]);
        next_script[i] = if scripts[i].is_common() {
            next_script[i + 1]
        } else {
            Some(scripts[i])
        };
    }

    let default_direction = next_direction[0].unwrap_or_default();
    let default_script = next_script[0].unwrap_or(Script::Common);

    let mut resolved: Vec<(TextDirection, Script)> = Vec::with_capacity(chars.len());
    for i in 0..chars.len() {
        let previous = resolved.last().copied();
        let direction = match (directions[i], previous) {
            (Some(d), _) => d,
            (None, None) => default_direction,
            (None, Some((TextDirection::RightToLeft, _)))
                if next_direction[i + 1] == Some(TextDirection::LeftToRight) =>
            {
                TextDirection::LeftToRight
            }
            (None, Some((d, _))) => d,
        };
        let attaches_forward = match previous {
            None => true,
            Some((d, _)) => directions[i].is_none() && d != direction,
        };
        let script = if !scripts[i].is_common() {
            scripts[i]
        } else if attaches_forward {
            next_script[i + 1].or(previous.map(|(_, s)| s)).unwrap_or(default_script)
        } else {
            previous.map(|(_, s)| s).unwrap_or(default_script)
        };
        resolved.push((direction, script));
    }

    let mut start = 0;
    for i in 1..=chars.len() {
        if i == chars.len() || resolved[i] != resolved[start] {
            let (direction, script) = resolved[start];
            runs.push(TextRun {
                range: SourceRange::new(map.byte_offset(start), map.byte_offset(i)),
                direction,
                script,
            });
            start = i;
        }
    }

    debug_assert_eq!(runs.last().map(|r| r.range.end), Some(text.len()));
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(text: &str) -> Vec<(&str, TextDirection)> {
        let map = ClusterMap::new(text);
        segment(text, &map)
            .iter()
            .map(|r| (&text[r.range.as_range()], r.direction))
            .collect()
    }

    #[test]
    fn test_cluster_map_binary_search() {
        let text = "aé漢b";
        let map = ClusterMap::new(text);
        assert_eq!(map.len(), 4);
        assert_eq!(map.codepoint_index(0), Some(0));
        assert_eq!(map.codepoint_index(2), Some(1)); // second byte of 'é'
        assert_eq!(map.codepoint_index(3), Some(2));
        assert_eq!(map.codepoint_index(5), Some(2));
        assert_eq!(map.codepoint_index(6), Some(3));
        assert_eq!(map.codepoint_index(7), None);
        assert_eq!(map.snap(4), 3);
        assert_eq!(map.char_at(6), Some('b'));
    }

    #[test]
    fn test_single_ltr_run() {
        assert_eq!(
            runs("hello, world"),
            vec![("hello, world", TextDirection::LeftToRight)]
        );
    }

    #[test]
    fn test_space_before_ltr_leaves_rtl_run() {
        use TextDirection::*;
        assert_eq!(
            runs("abc שלום def"),
            vec![("abc ", LeftToRight), ("שלום", RightToLeft), (" def", LeftToRight)]
        );
    }

    #[test]
    fn test_trailing_space_absorbed_into_rtl() {
        use TextDirection::*;
        assert_eq!(
            runs("abc שלום "),
            vec![("abc ", LeftToRight), ("שלום ", RightToLeft)]
        );
        assert_eq!(runs("שלום, עולם"), vec![("שלום, עולם", RightToLeft)]);
    }

    #[test]
    fn test_leading_neutrals_take_first_strong() {
        assert_eq!(
            runs("  שלום"),
            vec![("  שלום", TextDirection::RightToLeft)]
        );
    }

    #[test]
    fn test_script_change_splits_ltr_text() {
        let text = "abc한국";
        let map = ClusterMap::new(text);
        let runs = segment(text, &map);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].script, Script::Latin);
        assert_eq!(runs[1].script, Script::Hangul);
    }

    #[test]
    fn test_runs_cover_text() {
        let text = "12 abc שלום مرحبا 34!";
        let map = ClusterMap::new(text);
        let runs = segment(text, &map);
        let mut cursor = 0;
        for run in &runs {
            assert_eq!(run.range.begin, cursor);
            cursor = run.range.end;
        }
        assert_eq!(cursor, text.len());
    }
}
