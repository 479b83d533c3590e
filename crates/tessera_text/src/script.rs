//! Coarse script and direction classification
//!
//! Scripts are grouped into broad buckets by code point range. This is not a
//! full Unicode Script property lookup; it only needs to be fine enough that
//! each run handed to the shaping engine uses a single shaping model.

use tessera_paint::TextDirection;
use unicode_bidi::BidiClass;

/// Script bucket of a code point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    /// Digits, punctuation, whitespace, symbols and combining marks
    Common,
    Latin,
    Greek,
    Cyrillic,
    Hebrew,
    Arabic,
    Devanagari,
    Thai,
    Hangul,
    Kana,
    Han,
    /// Any other letter
    Other,
}

impl Script {
    pub fn of(c: char) -> Script {
        let cp = c as u32;

        match cp {
            0x1100..=0x11FF | 0x3130..=0x318F | 0xA960..=0xA97F | 0xAC00..=0xD7A3 | 0xD7B0..=0xD7FF => {
                Script::Hangul
            }

            0x3040..=0x309F | 0x30A0..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9D => Script::Kana,

            0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0x20000..=0x2EBEF => Script::Han,

            0x0600..=0x06FF | 0x0750..=0x077F | 0x08A0..=0x08FF | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF => {
                Script::Arabic
            }

            0x0900..=0x097F | 0xA8E0..=0xA8FF => Script::Devanagari,

            0x0E00..=0x0E7F => Script::Thai,

            0x0590..=0x05FF | 0xFB1D..=0xFB4F => Script::Hebrew,

            0x0400..=0x052F => Script::Cyrillic,

            0x0370..=0x03FF | 0x1F00..=0x1FFF => Script::Greek,

            _ if !c.is_alphabetic() => Script::Common,

            0x0041..=0x024F | 0x1E00..=0x1EFF => Script::Latin,

            _ => Script::Other,
        }
    }

    pub fn is_common(self) -> bool {
        self == Script::Common
    }

    /// ISO 15924 tag of the script, if it has a dedicated one
    pub fn iso15924_tag(self) -> Option<&'static [u8; 4]> {
        Some(match self {
            Script::Latin => b"Latn",
            Script::Greek => b"Grek",
            Script::Cyrillic => b"Cyrl",
            Script::Hebrew => b"Hebr",
            Script::Arabic => b"Arab",
            Script::Devanagari => b"Deva",
            Script::Thai => b"Thai",
            Script::Hangul => b"Hang",
            Script::Kana => b"Hira",
            Script::Han => b"Hani",
            Script::Common | Script::Other => return None,
        })
    }

    /// The matching rustybuzz script, if any
    pub fn to_rustybuzz(self) -> Option<rustybuzz::Script> {
        let tag = self.iso15924_tag()?;
        rustybuzz::Script::from_iso15924_tag(ttf_parser::Tag::from_bytes(tag))
    }
}

/// Strong bidirectional direction of a code point, `None` for neutrals
pub fn strong_direction(c: char) -> Option<TextDirection> {
    match unicode_bidi::bidi_class(c) {
        BidiClass::L => Some(TextDirection::LeftToRight),
        BidiClass::R | BidiClass::AL => Some(TextDirection::RightToLeft),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_buckets() {
        assert_eq!(Script::of('a'), Script::Latin);
        assert_eq!(Script::of('é'), Script::Latin);
        assert_eq!(Script::of('ש'), Script::Hebrew);
        assert_eq!(Script::of('م'), Script::Arabic);
        assert_eq!(Script::of('한'), Script::Hangul);
        assert_eq!(Script::of('漢'), Script::Han);
        assert_eq!(Script::of(' '), Script::Common);
        assert_eq!(Script::of('7'), Script::Common);
        assert_eq!(Script::of(','), Script::Common);
    }

    #[test]
    fn test_strong_direction() {
        assert_eq!(strong_direction('a'), Some(TextDirection::LeftToRight));
        assert_eq!(strong_direction('ש'), Some(TextDirection::RightToLeft));
        assert_eq!(strong_direction('م'), Some(TextDirection::RightToLeft));
        assert_eq!(strong_direction(' '), None);
        assert_eq!(strong_direction('1'), None);
    }
}
