//! Colour and stroke mapping for rendered nodes and edges.
//!
//! Node and edge `kind` strings are free-form; well-known kinds get their own
//! colour family and everything else falls back to neutral grey.

use serde::{Deserialize, Serialize};
use trellis_core::{Palette, StyleConfig};

/// RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub fn darken(&self, factor: f32) -> Self {
        Self {
            r: ((self.r as f32) * (1.0 - factor)) as u8,
            g: ((self.g as f32) * (1.0 - factor)) as u8,
            b: ((self.b as f32) * (1.0 - factor)) as u8,
            a: self.a,
        }
    }

    pub fn lighten(&self, factor: f32) -> Self {
        Self {
            r: ((self.r as f32) + (255.0 - self.r as f32) * factor) as u8,
            g: ((self.g as f32) + (255.0 - self.g as f32) * factor) as u8,
            b: ((self.b as f32) + (255.0 - self.b as f32) * factor) as u8,
            a: self.a,
        }
    }

    /// Pull each channel towards the colour's own grey level.
    pub fn desaturate(&self, factor: f32) -> Self {
        let grey = (self.r as f32 + self.g as f32 + self.b as f32) / 3.0;
        let mix = |c: u8| (c as f32 + (grey - c as f32) * factor) as u8;
        Self {
            r: mix(self.r),
            g: mix(self.g),
            b: mix(self.b),
            a: self.a,
        }
    }

    /// `#rrggbbaa`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeColors {
    pub fill: Color,
    pub border: Color,
    pub text: Color,
}

// Types and classes
pub const COLOR_TYPE_FILL: Color = Color::rgb(85, 85, 85);
pub const COLOR_TYPE_BORDER: Color = Color::rgb(70, 70, 70);

// Functions and methods
pub const COLOR_FUNCTION_FILL: Color = Color::rgb(200, 160, 80);
pub const COLOR_FUNCTION_BORDER: Color = Color::rgb(170, 130, 60);
pub const COLOR_FUNCTION_TEXT: Color = Color::rgb(30, 30, 30);

// Variables and fields
pub const COLOR_VARIABLE_FILL: Color = Color::rgb(80, 130, 180);
pub const COLOR_VARIABLE_BORDER: Color = Color::rgb(60, 110, 160);

// Files
pub const COLOR_FILE_FILL: Color = Color::rgb(80, 140, 100);
pub const COLOR_FILE_BORDER: Color = Color::rgb(60, 120, 80);

// Modules and namespaces
pub const COLOR_NAMESPACE_FILL: Color = Color::rgb(130, 100, 160);
pub const COLOR_NAMESPACE_BORDER: Color = Color::rgb(110, 80, 140);

pub const COLOR_UNKNOWN_FILL: Color = Color::rgb(100, 100, 100);
pub const COLOR_UNKNOWN_BORDER: Color = Color::rgb(80, 80, 80);

// Containers
pub const COLOR_CONTAINER_FILL: Color = Color::rgba(60, 60, 70, 200);
pub const COLOR_CONTAINER_BORDER: Color = Color::rgb(50, 50, 60);
pub const COLOR_CONTAINER_TEXT: Color = Color::rgb(200, 200, 200);

pub const COLOR_LIGHT_TEXT: Color = Color::rgb(255, 255, 255);
pub const COLOR_HIGHLIGHT: Color = Color::rgb(255, 200, 100);

pub const COLOR_EDGE_DEFAULT: Color = Color::rgb(120, 120, 120);
pub const COLOR_EDGE_CALL: Color = Color::rgb(200, 160, 80);
pub const COLOR_EDGE_INHERITANCE: Color = Color::rgb(80, 130, 180);
pub const COLOR_EDGE_IMPORT: Color = Color::rgb(80, 140, 100);
pub const COLOR_EDGE_AGGREGATED: Color = Color::rgb(160, 160, 170);

fn base_node_colors(kind: &str) -> NodeColors {
    match kind.to_ascii_lowercase().as_str() {
        "class" | "struct" | "interface" | "trait" | "type" | "enum" | "union" => NodeColors {
            fill: COLOR_TYPE_FILL,
            border: COLOR_TYPE_BORDER,
            text: COLOR_LIGHT_TEXT,
        },
        "function" | "method" => NodeColors {
            fill: COLOR_FUNCTION_FILL,
            border: COLOR_FUNCTION_BORDER,
            text: COLOR_FUNCTION_TEXT,
        },
        "variable" | "field" | "constant" => NodeColors {
            fill: COLOR_VARIABLE_FILL,
            border: COLOR_VARIABLE_BORDER,
            text: COLOR_LIGHT_TEXT,
        },
        "file" => NodeColors {
            fill: COLOR_FILE_FILL,
            border: COLOR_FILE_BORDER,
            text: COLOR_LIGHT_TEXT,
        },
        "module" | "namespace" | "package" => NodeColors {
            fill: COLOR_NAMESPACE_FILL,
            border: COLOR_NAMESPACE_BORDER,
            text: COLOR_LIGHT_TEXT,
        },
        _ => NodeColors {
            fill: COLOR_UNKNOWN_FILL,
            border: COLOR_UNKNOWN_BORDER,
            text: COLOR_LIGHT_TEXT,
        },
    }
}

fn apply_palette(colors: NodeColors, palette: Palette) -> NodeColors {
    match palette {
        Palette::Default => colors,
        Palette::Muted => NodeColors {
            fill: colors.fill.desaturate(0.6).lighten(0.15),
            border: colors.border.desaturate(0.6),
            text: colors.text,
        },
        Palette::HighContrast => NodeColors {
            fill: colors.fill.darken(0.4),
            border: COLOR_LIGHT_TEXT,
            text: COLOR_LIGHT_TEXT,
        },
    }
}

pub fn node_colors(kind: &str, palette: Palette) -> NodeColors {
    apply_palette(base_node_colors(kind), palette)
}

/// Collapsed containers are drawn solid so they read as a single node.
pub fn container_colors(collapsed: bool, palette: Palette) -> NodeColors {
    let fill = if collapsed {
        COLOR_CONTAINER_FILL.lighten(0.1).with_alpha(255)
    } else {
        COLOR_CONTAINER_FILL
    };
    apply_palette(
        NodeColors {
            fill,
            border: COLOR_CONTAINER_BORDER,
            text: COLOR_CONTAINER_TEXT,
        },
        palette,
    )
}

pub fn highlight_color(palette: Palette) -> Color {
    match palette {
        Palette::HighContrast => Color::rgb(255, 255, 0),
        _ => COLOR_HIGHLIGHT,
    }
}

pub fn edge_color(kind: &str, aggregated: bool, palette: Palette) -> Color {
    let base = if aggregated {
        COLOR_EDGE_AGGREGATED
    } else {
        match kind.to_ascii_lowercase().as_str() {
            "call" => COLOR_EDGE_CALL,
            "inheritance" | "extends" | "implements" => COLOR_EDGE_INHERITANCE,
            "import" | "include" => COLOR_EDGE_IMPORT,
            _ => COLOR_EDGE_DEFAULT,
        }
    };
    match palette {
        Palette::Default => base,
        Palette::Muted => base.desaturate(0.6),
        Palette::HighContrast => base.lighten(0.5),
    }
}

/// Stroke width for an edge standing in for `multiplicity` underlying edges.
///
/// Grows logarithmically and is capped at six times the configured width.
pub fn edge_width(style: &StyleConfig, multiplicity: usize) -> f32 {
    const MAX_FACTOR: f32 = 6.0;
    if multiplicity <= 1 {
        return style.line_width;
    }
    let factor = ((multiplicity as f32).log2() + 1.0).min(MAX_FACTOR);
    style.line_width * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_have_their_own_colours() {
        assert_eq!(node_colors("Function", Palette::Default).fill, COLOR_FUNCTION_FILL);
        assert_eq!(node_colors("gizmo", Palette::Default).fill, COLOR_UNKNOWN_FILL);
    }

    #[test]
    fn palettes_change_fills() {
        let default = node_colors("class", Palette::Default);
        let contrast = node_colors("class", Palette::HighContrast);
        assert_ne!(default.fill, contrast.fill);
        assert_eq!(contrast.text, COLOR_LIGHT_TEXT);
    }

    #[test]
    fn color_darken() {
        let darkened = Color::rgb(100, 100, 100).darken(0.5);
        assert_eq!(darkened.r, 50);
        assert_eq!(Color::rgb(255, 0, 16).to_hex(), "#ff0010ff");
    }

    #[test]
    fn aggregated_edges_thicken_with_multiplicity() {
        let style = StyleConfig::default();
        assert_eq!(edge_width(&style, 1), style.line_width);
        assert!(edge_width(&style, 4) > edge_width(&style, 2));
        assert_eq!(edge_width(&style, 1 << 20), style.line_width * 6.0);
    }
}
