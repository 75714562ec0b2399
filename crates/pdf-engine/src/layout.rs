//! Content-stream interpretation: turns a page's text-showing operators into
//! positioned glyphs, remembering where in the stream each glyph came from so
//! the redaction pass can rewrite exactly those bytes.

use crate::error::{EngineError, EngineResult};
use crate::fonts::LoadedFont;
use crate::geometry::{Matrix, Point, Rect};
use crate::objects::{deref, inherited, number, page_box, page_content, PageBox};
use doc_model::{BuiltinFont, RgbColor};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, Clone)]
pub(crate) struct Glyph {
    pub text: String,
    pub bbox: Rect,
    pub origin: Point,
    /// Effective size in points after the text and CTM scaling.
    pub size: f32,
    pub font: BuiltinFont,
    pub color: RgbColor,
    pub op_index: usize,
    /// Index of the string inside a `TJ` array; zero for the other operators.
    pub item: usize,
    pub bytes: Range<usize>,
    /// Horizontal displacement in unscaled text space, spacing included.
    pub advance: f32,
    /// Font size operand of the governing `Tf`.
    pub font_size: f32,
}

impl Glyph {
    pub fn is_blank(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }

    /// The `TJ` adjustment that moves the pen exactly as this glyph did.
    pub fn displacement(&self) -> f32 {
        if self.font_size == 0.0 {
            0.0
        } else {
            -self.advance * 1000.0 / self.font_size
        }
    }
}

pub(crate) struct PageLayout {
    pub content: Content,
    pub glyphs: Vec<Glyph>,
}

pub(crate) fn interpret(doc: &Document, page_id: ObjectId) -> EngineResult<PageLayout> {
    let bytes = page_content(doc, page_id)?;
    let content = Content::decode(&bytes)
        .map_err(|err| EngineError::Malformed(format!("page {page_id:?}: {err}")))?;
    let mut interpreter = Interpreter::new(load_fonts(doc, page_id), page_box(doc, page_id));
    for (index, op) in content.operations.iter().enumerate() {
        interpreter.step(index, op);
    }

    Ok(PageLayout { glyphs: interpreter.glyphs, content })
}

fn load_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, LoadedFont> {
    let fonts = inherited(doc, page_id, b"Resources")
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|resources| resources.get(b"Font").ok())
        .and_then(|obj| deref(doc, obj).ok())
        .and_then(|obj| obj.as_dict().ok());

    let Some(fonts) = fonts else {
        return HashMap::new();
    };

    fonts
        .iter()
        .filter_map(|(name, obj)| {
            let dict = deref(doc, obj).ok()?.as_dict().ok()?;
            let font = LoadedFont::load(doc, dict);
            log::debug!(
                "font /{} is {} ({:?})",
                String::from_utf8_lossy(name),
                font.base_font,
                font.builtin
            );
            Some((name.clone(), font))
        })
        .collect()
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: RgbColor,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
    font: Option<Vec<u8>>,
    font_size: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill: RgbColor::BLACK,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            font: None,
            font_size: 0.0,
        }
    }
}

struct Interpreter {
    fonts: HashMap<Vec<u8>, LoadedFont>,
    fallback_font: LoadedFont,
    page_box: PageBox,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    glyphs: Vec<Glyph>,
}

impl Interpreter {
    fn new(fonts: HashMap<Vec<u8>, LoadedFont>, page_box: PageBox) -> Self {
        Self {
            fonts,
            fallback_font: LoadedFont::builtin(BuiltinFont::Helvetica),
            page_box,
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            glyphs: Vec::new(),
        }
    }

    fn step(&mut self, index: usize, op: &Operation) {
        let nums: Vec<f32> = op.operands.iter().filter_map(number).collect();
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => {
                if let [a, b, c, d, e, f] = nums[..] {
                    self.state.ctm = Matrix::new(a, b, c, d, e, f).then(&self.state.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                self.state.font = op.operands.first().and_then(|o| o.as_name().ok()).map(<[u8]>::to_vec);
                if let Some(size) = op.operands.get(1).and_then(number) {
                    self.state.font_size = size;
                }
            }
            "Tc" => self.state.char_spacing = nums.first().copied().unwrap_or(0.0),
            "Tw" => self.state.word_spacing = nums.first().copied().unwrap_or(0.0),
            "Tz" => self.state.horizontal_scale = nums.first().copied().unwrap_or(100.0) / 100.0,
            "TL" => self.state.leading = nums.first().copied().unwrap_or(0.0),
            "Ts" => self.state.rise = nums.first().copied().unwrap_or(0.0),
            "Td" => {
                if let [tx, ty] = nums[..] {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let [tx, ty] = nums[..] {
                    self.state.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let [a, b, c, d, e, f] = nums[..] {
                    self.line_matrix = Matrix::new(a, b, c, d, e, f);
                    self.text_matrix = self.line_matrix;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(bytes) = op.operands.first().and_then(|o| o.as_str().ok()) {
                    self.show(bytes, index, 0);
                }
            }
            "'" => {
                self.next_line();
                if let Some(bytes) = op.operands.first().and_then(|o| o.as_str().ok()) {
                    self.show(bytes, index, 0);
                }
            }
            "\"" => {
                if let [aw, ac, ..] = nums[..] {
                    self.state.word_spacing = aw;
                    self.state.char_spacing = ac;
                }
                self.next_line();
                if let Some(bytes) = op.operands.get(2).and_then(|o| o.as_str().ok()) {
                    self.show(bytes, index, 0);
                }
            }
            "TJ" => {
                let Some(Object::Array(items)) = op.operands.first() else { return };
                for (item, element) in items.iter().enumerate() {
                    match element {
                        Object::String(bytes, _) => self.show(bytes, index, item),
                        other => {
                            if let Some(adjust) = number(other) {
                                let tx = -adjust / 1000.0
                                    * self.state.font_size
                                    * self.state.horizontal_scale;
                                self.text_matrix = Matrix::translate(tx, 0.0).then(&self.text_matrix);
                            }
                        }
                    }
                }
            }
            "g" => {
                if let [gray] = nums[..] {
                    self.state.fill = RgbColor { r: gray, g: gray, b: gray };
                }
            }
            "rg" => {
                if let [r, g, b] = nums[..] {
                    self.state.fill = RgbColor { r, g, b };
                }
            }
            "k" => {
                if let [c, m, y, k] = nums[..] {
                    self.state.fill = cmyk_to_rgb(c, m, y, k);
                }
            }
            "sc" | "scn" => match nums[..] {
                [gray] => self.state.fill = RgbColor { r: gray, g: gray, b: gray },
                [r, g, b] => self.state.fill = RgbColor { r, g, b },
                [c, m, y, k] => self.state.fill = cmyk_to_rgb(c, m, y, k),
                _ => {}
            },
            "cs" => self.state.fill = RgbColor::BLACK,
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn show(&mut self, bytes: &[u8], op_index: usize, item: usize) {
        let font = self
            .state
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback_font);
        let font_size = self.state.font_size;
        let scale = self.state.horizontal_scale;
        let ascent = font.ascent / 1000.0;
        let descent = font.descent / 1000.0;

        for (code, range) in font.codes(bytes) {
            let w0 = font.width(code) / 1000.0;
            let render = Matrix::new(font_size * scale, 0.0, 0.0, font_size, 0.0, self.state.rise)
                .then(&self.text_matrix)
                .then(&self.state.ctm);

            let corners: Vec<Point> = [(0.0, descent), (w0, descent), (w0, ascent), (0.0, ascent)]
                .iter()
                .map(|(x, y)| {
                    let (ux, uy) = render.apply(*x, *y);
                    self.page_box.to_document(ux, uy)
                })
                .collect();
            let (ox, oy) = render.apply(0.0, 0.0);

            let word_spacing =
                if !font.two_byte && code == 32 { self.state.word_spacing } else { 0.0 };
            let advance = w0 * font_size + self.state.char_spacing + word_spacing;
            let size = font_size.abs() * self.text_matrix.then(&self.state.ctm).vertical_scale();

            self.glyphs.push(Glyph {
                text: font.decode(code),
                bbox: Rect::bounding(&corners),
                origin: self.page_box.to_document(ox, oy),
                size,
                font: font.builtin,
                color: self.state.fill,
                op_index,
                item,
                bytes: range,
                advance,
                font_size,
            });

            self.text_matrix = Matrix::translate(advance * scale, 0.0).then(&self.text_matrix);
        }
    }
}

fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> RgbColor {
    RgbColor { r: (1.0 - c) * (1.0 - k), g: (1.0 - m) * (1.0 - k), b: (1.0 - y) * (1.0 - k) }
}
