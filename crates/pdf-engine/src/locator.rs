//! Word, line and block grouping over interpreted glyphs, plus the queries the
//! session exposes: word listing, hit testing and text search.

use crate::geometry::{Point, Rect};
use crate::layout::Glyph;
use doc_model::{BuiltinFont, RgbColor};

/// One word, or one search match, on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct WordSpan {
    pub bbox: Rect,
    pub text: String,
    pub block_index: usize,
    pub line_index: usize,
    pub word_index: usize,
}

/// Styling of the first glyph inside a region, used to re-insert text that
/// looks like what it replaced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RunStyle {
    pub font: BuiltinFont,
    pub size: f32,
    pub color: RgbColor,
}

#[derive(Debug)]
struct Word {
    glyphs: Vec<usize>,
}

#[derive(Debug)]
struct Line {
    block_index: usize,
    line_index: usize,
    words: Vec<Word>,
}

struct LineBuilder {
    baseline: f32,
    size: f32,
    last_x0: f32,
    last_x1: f32,
    word_break: bool,
    words: Vec<Word>,
}

impl LineBuilder {
    fn start(index: usize, glyph: &Glyph) -> Self {
        Self {
            baseline: glyph.origin.y,
            size: glyph.size.max(1.0),
            last_x0: glyph.bbox.x0,
            last_x1: glyph.bbox.x1,
            word_break: false,
            words: vec![Word { glyphs: vec![index] }],
        }
    }

    fn continues(&self, glyph: &Glyph) -> bool {
        let size = glyph.size.max(self.size);
        (glyph.origin.y - self.baseline).abs() <= 0.5 * size && glyph.bbox.x0 >= self.last_x0
    }

    fn push(&mut self, index: usize, glyph: &Glyph) {
        let gap = glyph.bbox.x0 - self.last_x1;
        let new_word = self.word_break || gap > 0.25 * glyph.size.max(1.0);
        match self.words.last_mut() {
            Some(word) if !new_word => word.glyphs.push(index),
            _ => self.words.push(Word { glyphs: vec![index] }),
        }
        self.last_x0 = glyph.bbox.x0;
        self.last_x1 = glyph.bbox.x1;
        self.word_break = false;
    }
}

/// Reading-order text structure of one page.
pub(crate) struct TextPage {
    glyphs: Vec<Glyph>,
    lines: Vec<Line>,
}

impl TextPage {
    pub fn build(glyphs: Vec<Glyph>) -> Self {
        let mut lines: Vec<Line> = Vec::new();
        let mut current: Option<LineBuilder> = None;
        let mut block_index = 0;
        let mut line_index = 0;
        let mut previous_baseline: Option<f32> = None;

        let mut finish = |builder: LineBuilder, block: usize, line: usize| {
            lines.push(Line { block_index: block, line_index: line, words: builder.words });
        };

        for (index, glyph) in glyphs.iter().enumerate() {
            if glyph.is_blank() {
                if let Some(builder) = current.as_mut() {
                    builder.word_break = true;
                }
                continue;
            }

            if let Some(builder) = current.as_mut() {
                if builder.continues(glyph) {
                    builder.push(index, glyph);
                    continue;
                }
            }

            if let Some(builder) = current.take() {
                finish(builder, block_index, line_index);
                line_index += 1;
            }

            if let Some(previous) = previous_baseline {
                let gap = glyph.origin.y - previous;
                let size = glyph.size.max(1.0);
                if gap > 1.5 * 1.2 * size || gap < -0.5 * size {
                    block_index += 1;
                    line_index = 0;
                }
            }
            previous_baseline = Some(glyph.origin.y);
            current = Some(LineBuilder::start(index, glyph));
        }

        if let Some(builder) = current.take() {
            finish(builder, block_index, line_index);
        }

        Self { glyphs, lines }
    }

    #[cfg(test)]
    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    pub fn words(&self) -> Vec<WordSpan> {
        let mut words = Vec::new();
        for line in &self.lines {
            for (word_index, word) in line.words.iter().enumerate() {
                words.push(WordSpan {
                    bbox: self.span_box(&word.glyphs),
                    text: self.span_text(&word.glyphs),
                    block_index: line.block_index,
                    line_index: line.line_index,
                    word_index,
                });
            }
        }
        words
    }

    pub fn hit_test(&self, point: Point) -> Option<WordSpan> {
        self.words().into_iter().find(|word| word.bbox.contains(point))
    }

    /// Words whose text equals `query` after trimming both.
    pub fn find_exact(&self, query: &str) -> Vec<WordSpan> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        self.words().into_iter().filter(|word| word.text.trim() == query).collect()
    }

    /// Case-sensitive, non-overlapping substring matches within each line.
    pub fn search(&self, query: &str) -> Vec<WordSpan> {
        let needle: Vec<char> = query.trim().chars().collect();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut matches = Vec::new();
        for line in &self.lines {
            // (character, glyph it came from, word it belongs to)
            let mut chars: Vec<(char, Option<usize>, usize)> = Vec::new();
            for (word_index, word) in line.words.iter().enumerate() {
                if word_index > 0 {
                    chars.push((' ', None, word_index));
                }
                for &glyph in &word.glyphs {
                    for ch in self.glyphs[glyph].text.chars() {
                        chars.push((ch, Some(glyph), word_index));
                    }
                }
            }

            let mut start = 0;
            while start + needle.len() <= chars.len() {
                let window = &chars[start..start + needle.len()];
                if window.iter().map(|(ch, _, _)| *ch).eq(needle.iter().copied()) {
                    let mut glyphs: Vec<usize> = window.iter().filter_map(|(_, g, _)| *g).collect();
                    glyphs.dedup();
                    if !glyphs.is_empty() {
                        matches.push(WordSpan {
                            bbox: self.span_box(&glyphs),
                            text: needle.iter().collect(),
                            block_index: line.block_index,
                            line_index: line.line_index,
                            word_index: window[0].2,
                        });
                    }
                    start += needle.len();
                } else {
                    start += 1;
                }
            }
        }
        matches
    }

    /// Page text in reading order, one line per row.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                line.words
                    .iter()
                    .map(|word| self.span_text(&word.glyphs))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn style_within(&self, rect: &Rect) -> Option<RunStyle> {
        self.glyphs
            .iter()
            .find(|glyph| !glyph.is_blank() && rect.contains(glyph.bbox.center()))
            .map(|glyph| RunStyle { font: glyph.font, size: glyph.size, color: glyph.color })
    }

    fn span_box(&self, glyphs: &[usize]) -> Rect {
        glyphs
            .iter()
            .map(|&index| self.glyphs[index].bbox)
            .reduce(|acc, bbox| acc.union(&bbox))
            .unwrap_or_default()
    }

    fn span_text(&self, glyphs: &[usize]) -> String {
        glyphs.iter().map(|&index| self.glyphs[index].text.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::interpret;
    use crate::test_support::{pdf_with_content, single_page};
    use lopdf::Document;

    fn text_page(doc: &Document) -> TextPage {
        let page_id = crate::objects::page_id(doc, 0).unwrap();
        TextPage::build(interpret(doc, page_id).unwrap().glyphs)
    }

    #[test]
    fn words_split_on_spaces_and_lines() {
        let doc = single_page(&[(72.0, 700.0, "Hello brave"), (72.0, 686.0, "new world")]);
        let page = text_page(&doc);
        let words = page.words();

        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, ["Hello", "brave", "new", "world"]);
        assert_eq!((words[1].block_index, words[1].line_index, words[1].word_index), (0, 0, 1));
        assert_eq!((words[2].block_index, words[2].line_index, words[2].word_index), (0, 1, 0));
        assert_eq!(page.text(), "Hello brave\nnew world");
    }

    #[test]
    fn wide_vertical_gaps_start_a_new_block() {
        let doc = single_page(&[(72.0, 700.0, "Title"), (72.0, 600.0, "Body")]);
        let words = text_page(&doc).words();
        assert_eq!(words[0].block_index, 0);
        assert_eq!((words[1].block_index, words[1].line_index), (1, 0));
    }

    #[test]
    fn positioned_gaps_split_words_without_spaces() {
        let content = b"BT /F1 12 Tf 72 700 Td [(Left) -2000 (Right)] TJ ET".to_vec();
        let doc = pdf_with_content(content);
        let texts: Vec<String> = text_page(&doc).words().into_iter().map(|w| w.text).collect();
        assert_eq!(texts, ["Left", "Right"]);
    }

    #[test]
    fn search_is_case_sensitive_and_non_overlapping() {
        let doc = single_page(&[(72.0, 700.0, "aaaa Hello hello")]);
        let page = text_page(&doc);

        assert_eq!(page.search("aa").len(), 2);
        assert_eq!(page.search("Hello").len(), 1);
        assert_eq!(page.search("  hello ").len(), 1);
        assert!(page.search("   ").is_empty());
        assert!(page.search("HELLO").is_empty());
    }

    #[test]
    fn overdrawn_text_counts_each_occurrence() {
        let doc = single_page(&[(72.0, 700.0, "Hello"), (72.0, 700.0, "Hello")]);
        let page = text_page(&doc);

        assert_eq!(page.search("Hello").len(), 2);
        assert_eq!(page.find_exact("Hello").len(), 2);
        assert_eq!(page.words().len(), 2);
    }

    #[test]
    fn search_spans_word_boundaries() {
        let doc = single_page(&[(72.0, 700.0, "Hello world")]);
        let page = text_page(&doc);
        let hits = page.search("o w");
        assert_eq!(hits.len(), 1);
        let words = page.words();
        assert!(hits[0].bbox.x0 < words[0].bbox.x1);
        assert!(hits[0].bbox.x1 > words[1].bbox.x0);
    }

    #[test]
    fn exact_matches_whole_words_only() {
        let doc = single_page(&[(72.0, 700.0, "Cat Category")]);
        let page = text_page(&doc);
        let hits = page.find_exact("Cat");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Cat");
        assert_eq!(page.search("Cat").len(), 2);
    }

    #[test]
    fn hit_test_returns_the_word_under_the_point() {
        let doc = single_page(&[(72.0, 700.0, "Hello world")]);
        let page = text_page(&doc);
        let world = page.words()[1].clone();

        assert_eq!(page.hit_test(world.bbox.center()), Some(world));
        assert_eq!(page.hit_test(Point::new(5.0, 5.0)), None);
    }

    #[test]
    fn style_within_reports_the_run_style() {
        let content = b"1 0 0 rg BT /F1 18 Tf 72 700 Td (Red) Tj ET".to_vec();
        let doc = pdf_with_content(content);
        let page = text_page(&doc);
        let word = page.words()[0].clone();

        let style = page.style_within(&word.bbox).unwrap();
        assert_eq!(style.font, BuiltinFont::Helvetica);
        assert!((style.size - 18.0).abs() < 1e-3);
        assert_eq!(style.color, RgbColor { r: 1.0, g: 0.0, b: 0.0 });
    }
}
