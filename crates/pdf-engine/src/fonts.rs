//! Font metrics and text decoding for content-stream interpretation.

use crate::objects::{deref, number};
use doc_model::BuiltinFont;
use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const TIMES_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

/// Advance width in 1/1000 text-space units for a WinAnsi code.
pub(crate) fn builtin_width(font: BuiltinFont, code: u32) -> f32 {
    let index = code.checked_sub(32).map(|i| i as usize);
    let width = match font {
        BuiltinFont::Courier => 600,
        BuiltinFont::Helvetica => index.and_then(|i| HELVETICA_WIDTHS.get(i)).copied().unwrap_or(556),
        BuiltinFont::TimesRoman => index.and_then(|i| TIMES_WIDTHS.get(i)).copied().unwrap_or(500),
    };
    width as f32
}

/// `(ascent, descent)` in 1/1000 units.
pub(crate) fn builtin_vertical_metrics(font: BuiltinFont) -> (f32, f32) {
    match font {
        BuiltinFont::Helvetica => (718.0, -207.0),
        BuiltinFont::TimesRoman => (683.0, -217.0),
        BuiltinFont::Courier => (629.0, -157.0),
    }
}

/// Characters WinAnsiEncoding places in 0x80..=0x9F; the rest follows Latin-1.
const WIN_ANSI_HIGH: [(u8, char); 27] = [
    (0x80, '€'), (0x82, '‚'), (0x83, 'ƒ'), (0x84, '„'), (0x85, '…'), (0x86, '†'),
    (0x87, '‡'), (0x88, 'ˆ'), (0x89, '‰'), (0x8A, 'Š'), (0x8B, '‹'), (0x8C, 'Œ'),
    (0x8E, 'Ž'), (0x91, '‘'), (0x92, '’'), (0x93, '“'), (0x94, '”'), (0x95, '•'),
    (0x96, '–'), (0x97, '—'), (0x98, '˜'), (0x99, '™'), (0x9A, 'š'), (0x9B, '›'),
    (0x9C, 'œ'), (0x9E, 'ž'), (0x9F, 'Ÿ'),
];

pub(crate) fn win_ansi_decode(code: u8) -> char {
    WIN_ANSI_HIGH
        .iter()
        .find(|(byte, _)| *byte == code)
        .map(|(_, ch)| *ch)
        .unwrap_or(code as char)
}

/// Encodes `text` for a WinAnsi simple font; unmappable characters become `?`.
pub(crate) fn win_ansi_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch as u32 {
            0x20..=0x7E | 0xA0..=0xFF => ch as u8,
            _ => WIN_ANSI_HIGH.iter().find(|(_, c)| *c == ch).map(|(b, _)| *b).unwrap_or(b'?'),
        })
        .collect()
}

/// Code-to-text mapping parsed from a `/ToUnicode` CMap.
#[derive(Debug, Clone, Default)]
pub(crate) struct ToUnicode {
    map: HashMap<u32, String>,
}

impl ToUnicode {
    pub fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let mut map = HashMap::new();

        for section in sections(&text, "beginbfchar", "endbfchar") {
            let tokens = hex_tokens(section);
            for pair in tokens.chunks_exact(2) {
                if let (Some(code), Some(dst)) = (hex_value(&pair[0]), utf16_hex(&pair[1])) {
                    map.insert(code, dst);
                }
            }
        }

        for section in sections(&text, "beginbfrange", "endbfrange") {
            parse_bfrange(section, &mut map);
        }

        Self { map }
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }
}

fn sections<'a>(text: &'a str, begin: &str, end: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(begin) {
        let after = &rest[start + begin.len()..];
        let Some(stop) = after.find(end) else { break };
        out.push(&after[..stop]);
        rest = &after[stop + end.len()..];
    }
    out
}

fn hex_tokens(section: &str) -> Vec<String> {
    section
        .split('<')
        .skip(1)
        .filter_map(|chunk| chunk.split_once('>').map(|(hex, _)| hex.trim().to_owned()))
        .collect()
}

fn hex_value(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

fn utf16_hex(hex: &str) -> Option<String> {
    let clean: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if !clean.is_ascii() {
        return None;
    }
    if clean.len() % 4 != 0 {
        return char::from_u32(hex_value(&clean)?).map(String::from);
    }
    let units: Vec<u16> = (0..clean.len())
        .step_by(4)
        .map(|i| u16::from_str_radix(&clean[i..i + 4], 16))
        .collect::<Result<_, _>>()
        .ok()?;
    String::from_utf16(&units).ok()
}

fn parse_bfrange(section: &str, map: &mut HashMap<u32, String>) {
    let mut rest = section.trim();
    loop {
        let Some((lo, after_lo)) = take_hex(rest) else { break };
        let Some((hi, after_hi)) = take_hex(after_lo) else { break };
        let (Some(lo), Some(hi)) = (hex_value(&lo), hex_value(&hi)) else { break };
        let after_hi = after_hi.trim_start();

        if let Some(array) = after_hi.strip_prefix('[') {
            let Some((body, tail)) = array.split_once(']') else { break };
            for (offset, dst) in hex_tokens(body).iter().enumerate() {
                let code = u32::try_from(offset).ok().and_then(|offset| lo.checked_add(offset));
                if let (Some(code), Some(text)) = (code, utf16_hex(dst)) {
                    map.insert(code, text);
                }
            }
            rest = tail;
        } else {
            let Some((dst, tail)) = take_hex(after_hi) else { break };
            if let Some(base) = utf16_hex(&dst) {
                let mut chars: Vec<char> = base.chars().collect();
                for code in lo..=hi.min(lo.saturating_add(0xFFFF)) {
                    map.insert(code, chars.iter().collect());
                    if let Some(last) = chars.last_mut() {
                        *last = char::from_u32(*last as u32 + 1).unwrap_or(*last);
                    }
                }
            }
            rest = tail;
        }
    }
}

fn take_hex(input: &str) -> Option<(String, &str)> {
    let start = input.trim_start().strip_prefix('<')?;
    let (hex, rest) = start.split_once('>')?;
    Some((hex.trim().to_owned(), rest))
}

#[derive(Debug, Clone)]
enum Widths {
    Simple { first_char: u32, widths: Vec<f32>, missing: f32 },
    Cid { default: f32, widths: HashMap<u32, f32> },
    Builtin,
}

/// A page font resolved far enough to measure and decode shown strings.
#[derive(Debug, Clone)]
pub(crate) struct LoadedFont {
    pub base_font: String,
    pub builtin: BuiltinFont,
    pub two_byte: bool,
    pub ascent: f32,
    pub descent: f32,
    widths: Widths,
    to_unicode: Option<ToUnicode>,
}

impl LoadedFont {
    pub fn load(doc: &Document, dict: &Dictionary) -> Self {
        let base_font = name_of(dict, b"BaseFont").unwrap_or_else(|| "Helvetica".to_owned());
        let builtin = BuiltinFont::classify(&base_font);
        let two_byte = name_of(dict, b"Subtype").as_deref() == Some("Type0");

        let descendant = if two_byte {
            dict.get(b"DescendantFonts")
                .ok()
                .and_then(|obj| deref(doc, obj).ok())
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| array.first())
                .and_then(|obj| deref(doc, obj).ok())
                .and_then(|obj| obj.as_dict().ok())
        } else {
            None
        };
        let metrics_dict = descendant.unwrap_or(dict);

        let descriptor = metrics_dict
            .get(b"FontDescriptor")
            .ok()
            .and_then(|obj| deref(doc, obj).ok())
            .and_then(|obj| obj.as_dict().ok());

        let (default_ascent, default_descent) = builtin_vertical_metrics(builtin);
        let ascent = descriptor
            .and_then(|d| d.get(b"Ascent").ok().and_then(number))
            .filter(|a| *a > 0.0)
            .unwrap_or(default_ascent);
        let descent = descriptor
            .and_then(|d| d.get(b"Descent").ok().and_then(number))
            .map(|d| -d.abs())
            .filter(|d| *d < 0.0)
            .unwrap_or(default_descent);

        let widths = if two_byte {
            cid_widths(doc, metrics_dict)
        } else {
            simple_widths(doc, dict, descriptor)
        };

        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| deref(doc, obj).ok())
            .and_then(|obj| obj.as_stream().ok())
            .and_then(|stream| {
                if stream.dict.has(b"Filter") {
                    stream.decompressed_content().ok()
                } else {
                    Some(stream.content.clone())
                }
            })
            .map(|data| ToUnicode::parse(&data));

        Self { base_font, builtin, two_byte, ascent, descent, widths, to_unicode }
    }

    /// Fallback used when a `Tf` names a font the resources do not define.
    pub fn builtin(font: BuiltinFont) -> Self {
        let (ascent, descent) = builtin_vertical_metrics(font);
        Self {
            base_font: font.base_font().to_owned(),
            builtin: font,
            two_byte: false,
            ascent,
            descent,
            widths: Widths::Builtin,
            to_unicode: None,
        }
    }

    /// Splits a shown string into `(code, byte range)` pairs.
    pub fn codes(&self, bytes: &[u8]) -> Vec<(u32, std::ops::Range<usize>)> {
        if self.two_byte {
            bytes
                .chunks(2)
                .enumerate()
                .map(|(i, chunk)| {
                    let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                    (code, i * 2..i * 2 + chunk.len())
                })
                .collect()
        } else {
            bytes.iter().enumerate().map(|(i, b)| (*b as u32, i..i + 1)).collect()
        }
    }

    pub fn width(&self, code: u32) -> f32 {
        match &self.widths {
            Widths::Simple { first_char, widths, missing } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            Widths::Cid { default, widths } => widths.get(&code).copied().unwrap_or(*default),
            Widths::Builtin => builtin_width(self.builtin, code),
        }
    }

    pub fn decode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|map| map.get(code)) {
            return text.to_owned();
        }
        if self.two_byte {
            char::from_u32(code).filter(|c| !c.is_control()).unwrap_or('\u{FFFD}').to_string()
        } else {
            win_ansi_decode(code as u8).to_string()
        }
    }
}

fn name_of(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key).ok().and_then(|obj| obj.as_name().ok()).map(|n| String::from_utf8_lossy(n).into_owned())
}

fn simple_widths(doc: &Document, dict: &Dictionary, descriptor: Option<&Dictionary>) -> Widths {
    let widths = dict
        .get(b"Widths")
        .ok()
        .and_then(|obj| deref(doc, obj).ok())
        .and_then(|obj| obj.as_array().ok());
    let Some(widths) = widths else {
        return Widths::Builtin;
    };

    let first_char = dict.get(b"FirstChar").ok().and_then(|o| o.as_i64().ok()).unwrap_or(0);
    let missing = descriptor
        .and_then(|d| d.get(b"MissingWidth").ok().and_then(number))
        .unwrap_or(0.0);
    let widths = widths
        .iter()
        .map(|obj| deref(doc, obj).ok().and_then(number).unwrap_or(missing))
        .collect();

    Widths::Simple { first_char: first_char.max(0) as u32, widths, missing }
}

fn cid_widths(doc: &Document, dict: &Dictionary) -> Widths {
    let default = dict.get(b"DW").ok().and_then(number).unwrap_or(1000.0);
    let mut widths = HashMap::new();

    let array = dict
        .get(b"W")
        .ok()
        .and_then(|obj| deref(doc, obj).ok())
        .and_then(|obj| obj.as_array().ok());
    if let Some(array) = array {
        let mut i = 0;
        while i < array.len() {
            let Some(first) = number(&array[i]) else { break };
            match array.get(i + 1) {
                Some(Object::Array(list)) => {
                    for (offset, w) in list.iter().enumerate() {
                        if let Some(w) = number(w) {
                            widths.insert(first as u32 + offset as u32, w);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let (Some(last), Some(w)) = (number(last), array.get(i + 2).and_then(number))
                    else {
                        break;
                    };
                    for code in first as u32..=last as u32 {
                        widths.insert(code, w);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    Widths::Cid { default, widths }
}
