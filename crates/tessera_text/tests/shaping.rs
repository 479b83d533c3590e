use tessera_paint::{FontId, Point, Size, TextDirection};
use tessera_text::{Result, Script, ShapedGlyph, ShapedText, ShapingEngine, TextShaper};

const PRIMARY: FontId = FontId(1);
const FALLBACK: FontId = FontId(2);

/// Deterministic engine: one glyph per code point, except "fi" which forms a
/// ligature and combining marks which add a zero-advance glyph to the cluster
/// of their base. The primary font has no glyphs for CJK ideographs.
struct MockEngine {
    with_fallback: bool,
}

impl ShapingEngine for MockEngine {
    fn shape(
        &self,
        font: FontId,
        text: &str,
        direction: TextDirection,
        _script: Script,
    ) -> Result<Vec<ShapedGlyph>> {
        let mut glyphs = Vec::new();
        let mut chars = text.char_indices().peekable();
        while let Some((cluster, c)) = chars.next() {
            if c == 'f' && chars.peek().map(|&(_, n)| n) == Some('i') {
                chars.next();
                glyphs.push(glyph(0xFB01, cluster, 9.0));
                continue;
            }
            let missing = font == PRIMARY && ('\u{4E00}'..='\u{9FFF}').contains(&c);
            let id = if missing { 0 } else { (c as u32 & 0x7FFF) as u16 + 1 };
            let advance = if c.is_whitespace() { 5.0 } else { 10.0 };
            glyphs.push(glyph(id, cluster, advance));
            while let Some((_, mark)) = chars.next_if(|&(_, n)| is_mark(n)) {
                glyphs.push(glyph((mark as u32 & 0x7FFF) as u16 + 1, cluster, 0.0));
            }
        }
        if direction == TextDirection::RightToLeft {
            glyphs.reverse();
        }
        Ok(glyphs)
    }

    fn fallback_font(&self, font: FontId) -> Option<FontId> {
        (self.with_fallback && font == PRIMARY).then_some(FALLBACK)
    }
}

fn is_mark(c: char) -> bool {
    ('\u{300}'..='\u{36F}').contains(&c) || ('\u{591}'..='\u{5C7}').contains(&c)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_test_writer()
        .try_init();
}

fn glyph(glyph_id: u16, cluster: usize, advance: f32) -> ShapedGlyph {
    ShapedGlyph {
        glyph_id,
        cluster,
        advance: Size::new(advance, 0.0),
        offset: Point::ZERO,
    }
}

fn shaper(with_fallback: bool) -> TextShaper<MockEngine> {
    TextShaper::new(MockEngine { with_fallback })
}

fn assert_round_trip(text: &str, shaped: &ShapedText) {
    let mut cursor = 0;
    for glyph in &shaped.glyphs {
        assert_eq!(
            glyph.source.begin, cursor,
            "gap or overlap before glyph {:?} in {:?}",
            glyph, text
        );
        cursor = glyph.source.end;
    }
    assert_eq!(cursor, text.len(), "glyphs do not cover {:?}", text);

    let rebuilt: String = shaped
        .glyphs
        .iter()
        .map(|g| &text[g.source.as_range()])
        .collect();
    assert_eq!(rebuilt, text);
}

#[test]
fn source_ranges_round_trip() {
    init_tracing();
    let shaper = shaper(true);
    for text in [
        "",
        "hello",
        "office fit",
        "abc שלום def",
        "مرحبا بالعالم 123",
        "mixed 漢字 and ﬁ ligatures",
        "e\u{301}\u{302} combining",
        "  שלום, עולם  ",
    ] {
        let shaped = shaper.shape(text, PRIMARY).unwrap();
        assert_round_trip(text, &shaped);
    }
}

#[test]
fn ligature_spans_both_code_points() {
    let shaped = shaper(false).shape("fit", PRIMARY).unwrap();
    assert_eq!(shaped.glyphs.len(), 2);
    assert_eq!(shaped.glyphs[0].glyph_id, 0xFB01);
    assert_eq!(shaped.glyphs[0].source.len(), 2);
    assert_eq!(shaped.glyphs[1].codepoint, 't');
}

#[test]
fn rtl_run_is_returned_in_logical_order() {
    let text = "abc שלום def";
    let shaped = shaper(false).shape(text, PRIMARY).unwrap();

    let rtl: Vec<char> = shaped
        .glyphs
        .iter()
        .filter(|g| g.direction == TextDirection::RightToLeft)
        .map(|g| g.codepoint)
        .collect();
    assert_eq!(rtl, vec!['ש', 'ל', 'ו', 'ם']);

    // Visual order flips the RTL run only
    let visual: String = shaped.visual_glyphs().iter().map(|g| g.codepoint).collect();
    assert_eq!(visual, "abc םולש def");
}

#[test]
fn whitespace_is_flagged() {
    let shaped = shaper(false).shape("a b", PRIMARY).unwrap();
    let flags: Vec<bool> = shaped.glyphs.iter().map(|g| g.is_whitespace).collect();
    assert_eq!(flags, vec![false, true, false]);
    assert_eq!(shaped.width(), 25.0);
}

#[test]
fn missing_glyphs_marked_without_fallback_font() {
    let shaped = shaper(false).shape("a漢b", PRIMARY).unwrap();
    assert!(shaped.glyphs[1].is_missing());
    assert!(shaped.glyphs[1].uses_fallback_font);
    assert!(!shaped.glyphs[0].uses_fallback_font);
    assert_eq!(shaped.font_for(&shaped.glyphs[1]), Some(PRIMARY));
}

#[test]
fn fallback_glyphs_are_spliced_in() {
    init_tracing();
    let text = "a漢字b";
    let shaped = shaper(true).shape(text, PRIMARY).unwrap();
    assert_round_trip(text, &shaped);

    assert_eq!(shaped.glyphs.len(), 4);
    assert!(shaped.glyphs.iter().all(|g| !g.is_missing()));

    let fallback: Vec<bool> = shaped.glyphs.iter().map(|g| g.uses_fallback_font).collect();
    assert_eq!(fallback, vec![false, true, true, false]);
    assert_eq!(shaped.font_for(&shaped.glyphs[0]), Some(PRIMARY));
    assert_eq!(shaped.font_for(&shaped.glyphs[1]), Some(FALLBACK));
}

/// Every glyph starting a cluster names the first code point of its own
/// range; the other glyphs of the cluster have an empty range and repeat it
fn assert_codepoints_in_range(text: &str, shaped: &ShapedText) {
    let mut cluster_start: Option<char> = None;
    for glyph in &shaped.glyphs {
        if glyph.source.is_empty() {
            assert_eq!(
                Some(glyph.codepoint),
                cluster_start,
                "mark glyph {:?} outside its cluster in {:?}",
                glyph,
                text
            );
        } else {
            let first = text[glyph.source.as_range()].chars().next();
            assert_eq!(
                first,
                Some(glyph.codepoint),
                "glyph {:?} maps to the wrong bytes in {:?}",
                glyph,
                text
            );
            cluster_start = first;
        }
    }
}

#[test]
fn marks_share_cluster_with_their_base() {
    init_tracing();
    let shaper = shaper(true);
    for text in [
        "e\u{301}a",
        "ca\u{308}fe\u{301} bar",
        "\u{5E9}\u{5C1}\u{5B8}\u{5DC}\u{5D5}\u{5B9}\u{5DD}",
        "abc \u{5E9}\u{5B8}\u{5DC}\u{5D5}\u{5B9}\u{5DD} de\u{301}f",
        "o\u{308}漢\u{301}字 fi",
    ] {
        let shaped = shaper.shape(text, PRIMARY).unwrap();
        assert_round_trip(text, &shaped);
        assert_codepoints_in_range(text, &shaped);
        assert!(shaped.glyphs.iter().all(|g| !g.is_missing()), "{:?}", text);
    }
}

#[test]
fn mark_inside_rtl_run_keeps_following_letter() {
    // Shin, qamats, lamed: the mark glyph must not take lamed's bytes
    let text = "\u{5E9}\u{5B8}\u{5DC}";
    let shaped = shaper(false).shape(text, PRIMARY).unwrap();

    assert_eq!(shaped.glyphs.len(), 3);
    assert!(shaped
        .glyphs
        .iter()
        .all(|g| g.direction == TextDirection::RightToLeft));
    assert_eq!(shaped.glyphs[0].source.as_range(), 0..4);
    assert!(shaped.glyphs[1].source.is_empty());
    assert_eq!(shaped.glyphs[2].codepoint, '\u{5DC}');
    assert_eq!(shaped.glyphs[2].source.as_range(), 4..6);
}

#[test]
fn fallback_replaces_whole_cluster_with_marks() {
    let text = "o\u{308}\u{6F22}\u{301}\u{5B57} fi";
    let shaped = shaper(true).shape(text, PRIMARY).unwrap();
    assert_round_trip(text, &shaped);

    // The primary mark on the replaced ideograph is dropped with it
    let ids: Vec<(char, bool)> = shaped
        .glyphs
        .iter()
        .map(|g| (g.codepoint, g.uses_fallback_font))
        .collect();
    assert_eq!(
        ids,
        vec![
            ('o', false),
            ('o', false),
            ('\u{6F22}', true),
            ('\u{6F22}', true),
            ('\u{5B57}', true),
            (' ', false),
            ('f', false),
        ]
    );
}
