//! Themes, fonts, and the background overlay.

use std::fs;
use std::path::Path;

use crate::rich::Rgb;

pub const DEFAULT_BACKGROUND_OPACITY: u8 = 10;
pub const OPACITY_STEP: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Classic,
    Modern,
    Vibrant,
    Nature,
    Sunset,
    Dark,
    Custom,
}

impl Theme {
    /// Selectable presets, in control-panel order.
    pub const PRESETS: [Theme; 6] = [
        Theme::Classic,
        Theme::Modern,
        Theme::Vibrant,
        Theme::Nature,
        Theme::Sunset,
        Theme::Dark,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Theme::Classic => "classic",
            Theme::Modern => "modern",
            Theme::Vibrant => "vibrant",
            Theme::Nature => "nature",
            Theme::Sunset => "sunset",
            Theme::Dark => "dark",
            Theme::Custom => "custom",
        }
    }

    /// Look up a preset by id. `custom` is not a preset and yields `None`.
    pub fn preset(id: &str) -> Option<Theme> {
        Self::PRESETS.into_iter().find(|t| t.id() == id)
    }

    pub fn label(self) -> &'static str {
        match self {
            Theme::Classic => "Classic",
            Theme::Modern => "Modern",
            Theme::Vibrant => "Vibrant",
            Theme::Nature => "Nature",
            Theme::Sunset => "Sunset",
            Theme::Dark => "Dark",
            Theme::Custom => "Custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub text: Rgb,
    pub fill: Rgb,
    pub line: Rgb,
    pub header_fill: Rgb,
    pub header_text: Rgb,
    pub alternate: Rgb,
}

const CLASSIC: Palette = Palette {
    text: Rgb(139, 69, 19),
    fill: Rgb(255, 255, 255),
    line: Rgb(221, 221, 221),
    header_fill: Rgb(248, 249, 250),
    header_text: Rgb(139, 69, 19),
    alternate: Rgb(252, 252, 252),
};

pub fn palette(theme: Theme, custom: Option<Rgb>) -> Palette {
    match theme {
        Theme::Classic => CLASSIC,
        Theme::Modern => Palette {
            text: Rgb(70, 130, 180),
            fill: Rgb(227, 242, 253),
            line: Rgb(144, 202, 249),
            header_fill: Rgb(187, 222, 251),
            header_text: Rgb(70, 130, 180),
            alternate: Rgb(240, 248, 255),
        },
        Theme::Vibrant => Palette {
            text: Rgb(155, 89, 182),
            fill: Rgb(243, 229, 245),
            line: Rgb(206, 147, 216),
            header_fill: Rgb(225, 190, 231),
            header_text: Rgb(155, 89, 182),
            alternate: Rgb(250, 240, 252),
        },
        Theme::Nature => Palette {
            text: Rgb(39, 174, 96),
            fill: Rgb(232, 245, 232),
            line: Rgb(165, 214, 167),
            header_fill: Rgb(200, 230, 201),
            header_text: Rgb(46, 125, 50),
            alternate: Rgb(241, 250, 241),
        },
        Theme::Sunset => Palette {
            text: Rgb(230, 126, 34),
            fill: Rgb(255, 243, 224),
            line: Rgb(255, 183, 77),
            header_fill: Rgb(255, 204, 128),
            header_text: Rgb(239, 108, 0),
            alternate: Rgb(255, 248, 236),
        },
        Theme::Dark => Palette {
            text: Rgb(255, 255, 255),
            fill: Rgb(66, 66, 66),
            line: Rgb(117, 117, 117),
            header_fill: Rgb(97, 97, 97),
            header_text: Rgb(255, 255, 255),
            alternate: Rgb(80, 80, 80),
        },
        Theme::Custom => match custom {
            Some(color) => Palette {
                text: color,
                header_text: color,
                ..CLASSIC
            },
            None => CLASSIC,
        },
    }
}

/// PDF base family a screen font maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfFont {
    Helvetica,
    Times,
    Courier,
}

impl PdfFont {
    /// Typst font fallback list for this family.
    pub fn typst_families(self) -> &'static [&'static str] {
        match self {
            PdfFont::Helvetica => &["Helvetica", "Arial", "Liberation Sans", "DejaVu Sans"],
            PdfFont::Times => &["Times New Roman", "Liberation Serif", "DejaVu Serif"],
            PdfFont::Courier => &["Courier New", "Liberation Mono", "DejaVu Sans Mono"],
        }
    }
}

const FONT_FAMILIES: &[(&str, &str, PdfFont)] = &[
    ("Arial, sans-serif", "Arial", PdfFont::Helvetica),
    ("'Inter', sans-serif", "Inter", PdfFont::Helvetica),
    ("'Roboto', sans-serif", "Roboto", PdfFont::Helvetica),
    ("'Open Sans', sans-serif", "Open Sans", PdfFont::Helvetica),
    ("'Lato', sans-serif", "Lato", PdfFont::Helvetica),
    ("'Montserrat', sans-serif", "Montserrat", PdfFont::Helvetica),
    ("'Poppins', sans-serif", "Poppins", PdfFont::Helvetica),
    ("'Source Sans Pro', sans-serif", "Source Sans Pro", PdfFont::Helvetica),
    ("'Nunito', sans-serif", "Nunito", PdfFont::Helvetica),
    ("'Raleway', sans-serif", "Raleway", PdfFont::Helvetica),
    ("'Ubuntu', sans-serif", "Ubuntu", PdfFont::Helvetica),
    ("Georgia, serif", "Georgia", PdfFont::Times),
    ("'Times New Roman', serif", "Times New Roman", PdfFont::Times),
    ("'Courier New', monospace", "Courier New", PdfFont::Courier),
    ("'Comic Sans MS', cursive", "Comic Sans MS", PdfFont::Helvetica),
    ("Helvetica, sans-serif", "Helvetica", PdfFont::Helvetica),
    ("Verdana, sans-serif", "Verdana", PdfFont::Helvetica),
    ("Trebuchet MS, sans-serif", "Trebuchet MS", PdfFont::Helvetica),
    ("Impact, sans-serif", "Impact", PdfFont::Helvetica),
];

/// One entry of the font family list, identified by its CSS value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontFamily(usize);

impl FontFamily {
    pub fn from_css(css: &str) -> Option<Self> {
        FONT_FAMILIES
            .iter()
            .position(|(c, _, _)| *c == css)
            .map(FontFamily)
    }

    pub fn css(self) -> &'static str {
        FONT_FAMILIES[self.0].0
    }

    pub fn label(self) -> &'static str {
        FONT_FAMILIES[self.0].1
    }

    pub fn pdf(self) -> PdfFont {
        FONT_FAMILIES[self.0].2
    }

    pub fn next(self) -> Self {
        FontFamily((self.0 + 1) % FONT_FAMILIES.len())
    }

    pub fn prev(self) -> Self {
        FontFamily((self.0 + FONT_FAMILIES.len() - 1) % FONT_FAMILIES.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl FontSize {
    pub fn id(self) -> &'static str {
        match self {
            FontSize::Small => "small",
            FontSize::Medium => "medium",
            FontSize::Large => "large",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "small" => Some(FontSize::Small),
            "medium" => Some(FontSize::Medium),
            "large" => Some(FontSize::Large),
            _ => None,
        }
    }

    /// Editor font size in CSS pixels.
    pub fn px(self) -> u8 {
        match self {
            FontSize::Small => 11,
            FontSize::Medium => 13,
            FontSize::Large => 15,
        }
    }

    /// Terminal lines per table row.
    pub fn row_height(self) -> u16 {
        match self {
            FontSize::Small => 1,
            FontSize::Medium => 2,
            FontSize::Large => 3,
        }
    }

    pub fn next(self) -> Self {
        match self {
            FontSize::Small => FontSize::Medium,
            FontSize::Medium => FontSize::Large,
            FontSize::Large => FontSize::Small,
        }
    }

    pub fn prev(self) -> Self {
        self.next().next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Svg,
    Webp,
}

impl ImageFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "gif" => Some(ImageFormat::Gif),
            "svg" => Some(ImageFormat::Svg),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Svg => "svg",
            ImageFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Background {
    pub name: String,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackgroundError {
    #[error("{0} is not an image (png, jpg, gif, svg, webp)")]
    NotAnImage(String),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read an image file for the canvas background.
pub fn load_background(path: &Path) -> Result<Background, BackgroundError> {
    let shown = path.display().to_string();
    let format = ImageFormat::from_path(path).ok_or_else(|| BackgroundError::NotAnImage(shown.clone()))?;
    let bytes = fs::read(path).map_err(|source| BackgroundError::Read {
        path: shown.clone(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(shown);
    Ok(Background { name, format, bytes })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleState {
    pub theme: Theme,
    /// Last colour applied through the custom colour control.
    pub custom_color: Option<Rgb>,
    pub font_family: FontFamily,
    pub font_size: FontSize,
    pub background: Option<Background>,
    /// Percent, 0..=100.
    pub background_opacity: u8,
}

impl Default for StyleState {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            custom_color: None,
            font_family: FontFamily::default(),
            font_size: FontSize::default(),
            background: None,
            background_opacity: DEFAULT_BACKGROUND_OPACITY,
        }
    }
}

impl StyleState {
    pub fn palette(&self) -> Palette {
        palette(self.theme, self.custom_color)
    }

    /// Theme id as persisted: `custom` only when a custom colour backs it.
    pub fn active_theme_id(&self) -> &'static str {
        match self.theme {
            Theme::Custom if self.custom_color.is_some() => Theme::Custom.id(),
            Theme::Custom => Theme::Classic.id(),
            preset => preset.id(),
        }
    }

    /// Whether the opacity and remove controls are shown.
    pub fn background_controls_visible(&self) -> bool {
        self.background.is_some()
    }

    pub fn set_background(&mut self, background: Background) {
        self.background = Some(background);
    }

    pub fn remove_background(&mut self) {
        self.background = None;
        self.background_opacity = DEFAULT_BACKGROUND_OPACITY;
    }

    pub fn adjust_opacity(&mut self, delta: i16) {
        let next = (self.background_opacity as i16 + delta).clamp(0, 100);
        self.background_opacity = next as u8;
    }
}
