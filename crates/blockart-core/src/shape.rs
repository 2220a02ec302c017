//! Shapes: what an add op draws on the canvas.

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::error::CanvasError;
use crate::geometry::{ink_cost, parse_path, Outline};
use crate::types::ShapeId;

/// The colour value meaning "no paint".
pub const TRANSPARENT: &str = "transparent";

/// Kinds of shape a client may draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShapeType {
    /// SVG path data.
    Path = 0,
}

impl ShapeType {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// The client-supplied description of a shape, as carried in an add op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeSpec {
    pub shape_type: ShapeType,
    pub svg: String,
    pub fill: String,
    pub stroke: String,
    /// Unix milliseconds; lets the same drawing be added again later.
    pub created_at: i64,
}

impl ShapeSpec {
    pub fn is_filled(&self) -> bool {
        self.fill != TRANSPARENT
    }
}

/// A validated shape with its geometry and ink cost resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub owner: PublicKey,
    pub spec: ShapeSpec,
    pub outline: Outline,
    pub ink_cost: u64,
}

impl Shape {
    /// Resolve a spec into a shape.
    ///
    /// Checks the path syntax and the fill rules, but not the canvas bounds
    /// or other shapes.
    pub fn build(id: ShapeId, owner: PublicKey, spec: ShapeSpec) -> Result<Self, CanvasError> {
        let outline = parse_path(&spec.svg)?;

        if spec.fill == TRANSPARENT && spec.stroke == TRANSPARENT {
            return Err(CanvasError::InvalidShapeSvgString(spec.svg.clone()));
        }

        let filled = spec.is_filled();
        if filled && !outline.is_fillable() {
            return Err(CanvasError::InvalidShapeSvgString(spec.svg.clone()));
        }

        let ink_cost = ink_cost(&outline, filled);
        if filled && ink_cost == 0 {
            return Err(CanvasError::InvalidShapeSvgString(spec.svg.clone()));
        }

        Ok(Self {
            id,
            owner,
            spec,
            outline,
            ink_cost,
        })
    }

    pub fn is_filled(&self) -> bool {
        self.spec.is_filled()
    }

    /// `<path>` element in the shape's own colours.
    pub fn to_svg(&self) -> String {
        render_path(&self.spec.svg, &self.spec.stroke, &self.spec.fill)
    }

    /// `<path>` element painted over in white, for deleted shapes.
    pub fn to_erased_svg(&self) -> String {
        let fill = if self.is_filled() { "white" } else { TRANSPARENT };
        render_path(&self.spec.svg, "white", fill)
    }
}

fn render_path(d: &str, stroke: &str, fill: &str) -> String {
    format!(r#"<path d="{d}" stroke="{stroke}" fill="{fill}"/>"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(svg: &str, fill: &str, stroke: &str) -> ShapeSpec {
        ShapeSpec {
            shape_type: ShapeType::Path,
            svg: svg.to_string(),
            fill: fill.to_string(),
            stroke: stroke.to_string(),
            created_at: 0,
        }
    }

    fn build(svg: &str, fill: &str, stroke: &str) -> Result<Shape, CanvasError> {
        Shape::build(ShapeId::from_bytes([1; 32]), PublicKey([2; 32]), spec(svg, fill, stroke))
    }

    #[test]
    fn test_filled_square_costs_area() {
        let shape = build("M 0 0 H 5 V 5 h -5 Z", "red", "blue").unwrap();
        assert!(shape.is_filled());
        assert_eq!(shape.ink_cost, 25);
    }

    #[test]
    fn test_stroke_only_square_costs_perimeter() {
        let shape = build("M 0 0 H 5 V 5 h -5 Z", TRANSPARENT, "blue").unwrap();
        assert!(!shape.is_filled());
        assert_eq!(shape.ink_cost, 20);
    }

    #[test]
    fn test_fill_requires_closed_simple_path() {
        assert!(matches!(
            build("M 0 0 L 5 0 L 5 5", "red", "red"),
            Err(CanvasError::InvalidShapeSvgString(_))
        ));
        assert!(matches!(
            build("M 0 0 L 10 10 L 10 0 L 0 10 Z", "red", "red"),
            Err(CanvasError::InvalidShapeSvgString(_))
        ));
        // Open paths are fine without fill.
        assert!(build("M 0 0 L 5 0 L 5 5", TRANSPARENT, "red").is_ok());
    }

    #[test]
    fn test_fully_transparent_is_rejected() {
        assert!(matches!(
            build("M 0 0 L 5 0", TRANSPARENT, TRANSPARENT),
            Err(CanvasError::InvalidShapeSvgString(_))
        ));
    }

    #[test]
    fn test_svg_rendering() {
        let shape = build("M 0 0 H 5 V 5 h -5 Z", "red", "blue").unwrap();
        assert_eq!(shape.to_svg(), r#"<path d="M 0 0 H 5 V 5 h -5 Z" stroke="blue" fill="red"/>"#);
        assert_eq!(
            shape.to_erased_svg(),
            r#"<path d="M 0 0 H 5 V 5 h -5 Z" stroke="white" fill="white"/>"#
        );

        let line = build("M 0 0 L 5 0", TRANSPARENT, "blue").unwrap();
        assert!(line.to_erased_svg().contains(r#"fill="transparent""#));
    }
}
