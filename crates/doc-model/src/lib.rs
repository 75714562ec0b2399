use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StyleError {
    #[error("font size must be a positive number, got {0}")]
    InvalidSize(f32),
    #[error("color component {0} is outside 0.0..=1.0")]
    ComponentOutOfRange(f32),
    #[error("unrecognised color {0:?}")]
    UnknownColor(String),
}

/// Font families offered for inserted text.
///
/// The set is closed; every family resolves to a builtin Type1 font so no font
/// file ever has to be embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FontFamily {
    #[default]
    Arial,
    TimesNewRoman,
    Courier,
    Verdana,
}

impl FontFamily {
    pub const ALL: [FontFamily; 4] =
        [FontFamily::Arial, FontFamily::TimesNewRoman, FontFamily::Courier, FontFamily::Verdana];

    /// Unknown names fall back to the default family.
    pub fn from_name(name: &str) -> Self {
        let trimmed = name.trim();
        Self::ALL
            .into_iter()
            .find(|family| family.display_name().eq_ignore_ascii_case(trimmed))
            .unwrap_or_default()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            FontFamily::Arial => "Arial",
            FontFamily::TimesNewRoman => "Times New Roman",
            FontFamily::Courier => "Courier",
            FontFamily::Verdana => "Verdana",
        }
    }

    pub fn builtin(self) -> BuiltinFont {
        match self {
            FontFamily::Arial | FontFamily::Verdana => BuiltinFont::Helvetica,
            FontFamily::TimesNewRoman => BuiltinFont::TimesRoman,
            FontFamily::Courier => BuiltinFont::Courier,
        }
    }
}

impl From<String> for FontFamily {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<FontFamily> for String {
    fn from(value: FontFamily) -> Self {
        value.display_name().to_owned()
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Standard-14 outline fonts that inserted text is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinFont {
    Helvetica,
    TimesRoman,
    Courier,
}

impl BuiltinFont {
    pub fn base_font(self) -> &'static str {
        match self {
            BuiltinFont::Helvetica => "Helvetica",
            BuiltinFont::TimesRoman => "Times-Roman",
            BuiltinFont::Courier => "Courier",
        }
    }

    /// Resource name used when the font is registered on a page.
    pub fn resource_name(self) -> &'static str {
        match self {
            BuiltinFont::Helvetica => "EdHelv",
            BuiltinFont::TimesRoman => "EdTiRo",
            BuiltinFont::Courier => "EdCour",
        }
    }

    /// Nearest builtin for an arbitrary PDF `BaseFont` name, including subset
    /// prefixes such as `ABCDEF+TimesNewRomanPSMT`.
    pub fn classify(base_font: &str) -> Self {
        let name = base_font.rsplit('+').next().unwrap_or(base_font).to_ascii_lowercase();
        if name.contains("courier") || name.contains("mono") {
            BuiltinFont::Courier
        } else if name.contains("times")
            || name.contains("georgia")
            || name.contains("garamond")
            || (name.contains("serif") && !name.contains("sans"))
        {
            BuiltinFont::TimesRoman
        } else {
            BuiltinFont::Helvetica
        }
    }

    pub fn family(self) -> FontFamily {
        match self {
            BuiltinFont::Helvetica => FontFamily::Arial,
            BuiltinFont::TimesRoman => FontFamily::TimesNewRoman,
            BuiltinFont::Courier => FontFamily::Courier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor { r: 0.0, g: 0.0, b: 0.0 };
    pub const YELLOW: RgbColor = RgbColor { r: 1.0, g: 1.0, b: 0.0 };

    pub fn new(r: f32, g: f32, b: f32) -> Result<Self, StyleError> {
        for component in [r, g, b] {
            if !(0.0..=1.0).contains(&component) {
                return Err(StyleError::ComponentOutOfRange(component));
            }
        }
        Ok(Self { r, g, b })
    }

    pub fn components(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        self.components().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

impl FromStr for RgbColor {
    type Err = StyleError;

    /// Accepts a named color, `#RRGGBB`, or `r,g,b` with components in 0..=1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        match value.to_ascii_lowercase().as_str() {
            "black" => return Ok(RgbColor::BLACK),
            "red" => return Ok(RgbColor { r: 1.0, g: 0.0, b: 0.0 }),
            "green" => return Ok(RgbColor { r: 0.0, g: 1.0, b: 0.0 }),
            "blue" => return Ok(RgbColor { r: 0.0, g: 0.0, b: 1.0 }),
            "yellow" => return Ok(RgbColor::YELLOW),
            _ => {}
        }

        if let Some(hex) = value.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(StyleError::UnknownColor(s.to_owned()));
            }
            let channel = |range: std::ops::Range<usize>| {
                u8::from_str_radix(&hex[range], 16)
                    .map(|v| v as f32 / 255.0)
                    .map_err(|_| StyleError::UnknownColor(s.to_owned()))
            };
            return RgbColor::new(channel(0..2)?, channel(2..4)?, channel(4..6)?);
        }

        let parts: Vec<f32> = value
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|_| StyleError::UnknownColor(s.to_owned()))?;
        match parts.as_slice() {
            [r, g, b] => RgbColor::new(*r, *g, *b),
            _ => Err(StyleError::UnknownColor(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub family: FontFamily,
    pub size: f32,
    pub color: RgbColor,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self { family: FontFamily::Arial, size: 12.0, color: RgbColor::BLACK }
    }
}

impl TextStyle {
    pub fn validate(&self) -> Result<(), StyleError> {
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(StyleError::InvalidSize(self.size));
        }
        RgbColor::new(self.color.r, self.color.g, self.color.b).map(|_| ())
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    pub fn with_color(mut self, color: RgbColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_family(mut self, family: FontFamily) -> Self {
        self.family = family;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub text_style: TextStyle,
    pub initial_zoom: f32,
    pub zoom_step: f32,
    pub highlight_color: RgbColor,
    /// Directory that working copies are created in; the system temp dir when unset.
    pub working_root: Option<PathBuf>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            text_style: TextStyle::default(),
            initial_zoom: 1.0,
            zoom_step: 1.2,
            highlight_color: RgbColor::YELLOW,
            working_root: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_map_to_builtin_fonts() {
        assert_eq!(FontFamily::Arial.builtin(), BuiltinFont::Helvetica);
        assert_eq!(FontFamily::Verdana.builtin(), BuiltinFont::Helvetica);
        assert_eq!(FontFamily::TimesNewRoman.builtin(), BuiltinFont::TimesRoman);
        assert_eq!(FontFamily::Courier.builtin(), BuiltinFont::Courier);
    }

    #[test]
    fn unknown_family_falls_back_to_default() {
        assert_eq!(FontFamily::from_name("Comic Sans"), FontFamily::Arial);
        assert_eq!(FontFamily::from_name("times new roman"), FontFamily::TimesNewRoman);
    }

    #[test]
    fn classify_strips_subset_prefix() {
        assert_eq!(BuiltinFont::classify("ABCDEF+TimesNewRomanPSMT"), BuiltinFont::TimesRoman);
        assert_eq!(BuiltinFont::classify("CourierNewPS-BoldMT"), BuiltinFont::Courier);
        assert_eq!(BuiltinFont::classify("DejaVuSans"), BuiltinFont::Helvetica);
        assert_eq!(BuiltinFont::classify("DejaVuSerif"), BuiltinFont::TimesRoman);
    }

    #[test]
    fn parses_named_hex_and_triplet_colors() {
        assert_eq!("Red".parse::<RgbColor>().unwrap(), RgbColor { r: 1.0, g: 0.0, b: 0.0 });
        assert_eq!("#0000FF".parse::<RgbColor>().unwrap(), RgbColor { r: 0.0, g: 0.0, b: 1.0 });
        assert_eq!("0, 0.5, 1".parse::<RgbColor>().unwrap(), RgbColor { r: 0.0, g: 0.5, b: 1.0 });
        assert!(matches!("1.5,0,0".parse::<RgbColor>(), Err(StyleError::ComponentOutOfRange(_))));
        assert!(matches!("mauve".parse::<RgbColor>(), Err(StyleError::UnknownColor(_))));
    }

    #[test]
    fn style_validation_rejects_non_positive_size() {
        assert!(TextStyle::default().validate().is_ok());
        assert_eq!(
            TextStyle::default().with_size(0.0).validate(),
            Err(StyleError::InvalidSize(0.0))
        );
    }

    #[test]
    fn family_serializes_as_display_name() {
        let json = serde_json::to_string(&TextStyle::default()).unwrap();
        assert!(json.contains("\"family\":\"Arial\""));

        let parsed: TextStyle =
            serde_json::from_str(r#"{"family":"Wingdings","size":9.0,"color":{"r":0,"g":0,"b":0}}"#)
                .unwrap();
        assert_eq!(parsed.family, FontFamily::Arial);
    }
}
