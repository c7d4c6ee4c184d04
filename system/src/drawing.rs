use crate::message::SystemError;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type Point = euclid::default::Point2D<f32>;
pub type Bounds = euclid::default::Box2D<f32>;

/// Client-chosen identity of a stroke or shape, used to delete it later.
pub type StrokeId = String;

pub const MAX_STROKE_WIDTH: f32 = 500.0;
pub const MAX_STROKE_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color {0:?}, expected #rgb or #rrggbb")]
pub struct InvalidColor(pub String);

/// CSS hex color. Kept as the exact string the client sent so that relayed
/// events are identical to the originals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Color {
    fn default() -> Self {
        Self("#000000".into())
    }
}

impl FromStr for Color {
    type Err = InvalidColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('#')
            .ok_or_else(|| InvalidColor(s.to_string()))?;
        if matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidColor(s.to_string()))
        }
    }
}

impl TryFrom<String> for Color {
    type Error = InvalidColor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Pen,
    Eraser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Circle,
    Square,
    Rectangle,
    Triangle,
    Hexagon,
    Star,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub tool: Tool,
    pub color: Color,
    pub width: f32,
}

/// One incremental canvas mutation. Relayed to the other members of the
/// sender's room, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawingEvent {
    BeginStroke {
        stroke_id: StrokeId,
        style: StrokeStyle,
        point: Point,
    },
    StrokeSegment {
        style: StrokeStyle,
        from: Point,
        to: Point,
    },
    EndStroke,
    Shape {
        stroke_id: StrokeId,
        shape: ShapeKind,
        bounds: Bounds,
        color: Color,
        width: f32,
    },
    /// Removes one earlier stroke or shape from every member's canvas.
    DeleteStroke {
        stroke_id: StrokeId,
    },
    Clear,
}

impl DrawingEvent {
    pub fn is_clear(&self) -> bool {
        matches!(self, DrawingEvent::Clear)
    }

    /// Minimal shape validation. Anything that passes is relayed unmodified.
    pub fn validate(&self) -> Result<(), SystemError> {
        match self {
            DrawingEvent::BeginStroke {
                stroke_id,
                style,
                point,
            } => {
                validate_stroke_id(stroke_id)?;
                validate_width(style.width)?;
                validate_point("point", point)
            }
            DrawingEvent::StrokeSegment { style, from, to } => {
                validate_width(style.width)?;
                validate_point("from", from)?;
                validate_point("to", to)
            }
            DrawingEvent::Shape {
                stroke_id,
                bounds,
                width,
                ..
            } => {
                validate_stroke_id(stroke_id)?;
                validate_width(*width)?;
                validate_point("bounds.min", &bounds.min)?;
                validate_point("bounds.max", &bounds.max)
            }
            DrawingEvent::DeleteStroke { stroke_id } => validate_stroke_id(stroke_id),
            DrawingEvent::EndStroke | DrawingEvent::Clear => Ok(()),
        }
    }
}

pub fn validate_point(field: &str, point: &Point) -> Result<(), SystemError> {
    if point.x.is_finite() && point.y.is_finite() {
        Ok(())
    } else {
        Err(SystemError::MalformedEvent(format!(
            "{} must have finite coordinates",
            field
        )))
    }
}

fn validate_stroke_id(stroke_id: &str) -> Result<(), SystemError> {
    if !stroke_id.is_empty() && stroke_id.len() <= MAX_STROKE_ID_LEN {
        Ok(())
    } else {
        Err(SystemError::MalformedEvent(format!(
            "stroke id must be 1 to {} bytes long",
            MAX_STROKE_ID_LEN
        )))
    }
}

fn validate_width(width: f32) -> Result<(), SystemError> {
    if width.is_finite() && width > 0.0 && width <= MAX_STROKE_WIDTH {
        Ok(())
    } else {
        Err(SystemError::MalformedEvent(format!(
            "width must be in (0, {}], got {}",
            MAX_STROKE_WIDTH, width
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pen(width: f32) -> StrokeStyle {
        StrokeStyle {
            tool: Tool::Pen,
            color: "#000".parse().unwrap(),
            width,
        }
    }

    #[test]
    fn it_accepts_short_and_long_hex_colors() {
        assert_eq!("#000".parse::<Color>().unwrap().as_str(), "#000");
        assert_eq!("#1a2B3c".parse::<Color>().unwrap().as_str(), "#1a2B3c");
    }

    #[test]
    fn it_rejects_invalid_colors() {
        assert!("000".parse::<Color>().is_err());
        assert!("#12345".parse::<Color>().is_err());
        assert!("#zzz".parse::<Color>().is_err());
    }

    #[test]
    fn it_validates_stroke_width() {
        let ok = DrawingEvent::BeginStroke {
            stroke_id: "s1".into(),
            style: pen(4.0),
            point: Point::new(10.0, 10.0),
        };
        assert!(ok.validate().is_ok());

        for width in [0.0, -1.0, f32::NAN, MAX_STROKE_WIDTH + 1.0] {
            let bad = DrawingEvent::BeginStroke {
                stroke_id: "s1".into(),
                style: pen(width),
                point: Point::new(10.0, 10.0),
            };
            assert!(matches!(
                bad.validate(),
                Err(SystemError::MalformedEvent(_))
            ));
        }
    }

    #[test]
    fn it_rejects_non_finite_geometry() {
        let segment = DrawingEvent::StrokeSegment {
            style: pen(2.0),
            from: Point::new(0.0, 0.0),
            to: Point::new(f32::INFINITY, 1.0),
        };
        assert!(segment.validate().is_err());

        let shape = DrawingEvent::Shape {
            stroke_id: "s2".into(),
            shape: ShapeKind::Circle,
            bounds: Bounds::new(Point::new(0.0, f32::NAN), Point::new(1.0, 1.0)),
            color: Color::default(),
            width: 1.0,
        };
        assert!(shape.validate().is_err());
    }

    #[test]
    fn clear_and_end_stroke_are_always_valid() {
        assert!(DrawingEvent::Clear.validate().is_ok());
        assert!(DrawingEvent::EndStroke.validate().is_ok());
        assert!(DrawingEvent::Clear.is_clear());
    }

    #[test]
    fn stroke_ids_must_be_present_and_short() {
        let delete = |stroke_id: &str| DrawingEvent::DeleteStroke {
            stroke_id: stroke_id.into(),
        };
        assert!(delete("b7c1-42").validate().is_ok());
        assert!(delete("").validate().is_err());
        assert!(delete(&"x".repeat(MAX_STROKE_ID_LEN + 1)).validate().is_err());

        let unnamed = DrawingEvent::BeginStroke {
            stroke_id: String::new(),
            style: pen(2.0),
            point: Point::new(1.0, 1.0),
        };
        assert!(matches!(
            unnamed.validate(),
            Err(SystemError::MalformedEvent(_))
        ));
    }
}
