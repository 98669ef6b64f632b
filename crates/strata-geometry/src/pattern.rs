//! Geometric inclusions placed in a layer's unit cell.
//!
//! Patterns in a layer form a forest: each one is embedded either in the
//! layer background or in an earlier pattern that encloses it. The parent is
//! stored as a positional index into the layer's pattern list and is
//! validated when the pattern is inserted.

use serde::{Deserialize, Serialize};

use crate::GeometryError;

/// A stripe of a 1-D grating, infinite along y.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grating {
    pub center: f64,
    pub width: f64,
}

/// A rectangle rotated counter-clockwise by `angle_deg` about its centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub center: [f64; 2],
    /// Full widths along the rectangle's own axes.
    pub widths: [f64; 2],
    pub angle_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: [f64; 2],
    pub radius: f64,
}

/// An ellipse rotated counter-clockwise by `angle_deg` about its centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub center: [f64; 2],
    /// Semi-axes along the ellipse's own axes.
    pub half_widths: [f64; 2],
    pub angle_deg: f64,
}

/// A simple polygon. Vertices are relative to `center` and rotated by
/// `angle_deg`; either winding order is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub center: [f64; 2],
    pub angle_deg: f64,
    pub vertices: Vec<[f64; 2]>,
}

/// Shape of an inclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Grating(Grating),
    Rectangle(Rectangle),
    Circle(Circle),
    Ellipse(Ellipse),
    Polygon(Polygon),
}

/// One inclusion in a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub shape: Shape,
    /// Index of the inclusion material in the owning material registry.
    pub material: usize,
    /// Index of the enclosing pattern in the same layer, if any.
    pub parent: Option<usize>,
}

fn rotate(p: [f64; 2], angle_deg: f64) -> [f64; 2] {
    let (s, c) = angle_deg.to_radians().sin_cos();
    [c * p[0] - s * p[1], s * p[0] + c * p[1]]
}

const BOUNDARY_SAMPLES: usize = 64;

impl Shape {
    /// Check the shape's parameters.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let positive = |v: f64, what: &str| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(GeometryError::InvalidPattern(format!("{what} must be positive, got {v}")))
            }
        };
        match self {
            Shape::Grating(g) => positive(g.width, "grating width"),
            Shape::Rectangle(r) => {
                positive(r.widths[0], "rectangle width")?;
                positive(r.widths[1], "rectangle height")
            }
            Shape::Circle(c) => positive(c.radius, "circle radius"),
            Shape::Ellipse(e) => {
                positive(e.half_widths[0], "ellipse semi-axis")?;
                positive(e.half_widths[1], "ellipse semi-axis")
            }
            Shape::Polygon(p) => {
                if p.vertices.len() < 3 {
                    return Err(GeometryError::OutOfRange(format!(
                        "a polygon needs at least 3 vertices, got {}",
                        p.vertices.len()
                    )));
                }
                if polygon_signed_area(&p.absolute_vertices()).abs() <= 0.0 {
                    return Err(GeometryError::InvalidPattern("polygon has zero area".into()));
                }
                Ok(())
            }
        }
    }

    /// Whether a point lies inside the shape or on its boundary.
    pub fn contains(&self, point: [f64; 2]) -> bool {
        const TOL: f64 = 1e-12;
        match self {
            Shape::Grating(g) => (point[0] - g.center).abs() <= g.width / 2.0 * (1.0 + TOL),
            Shape::Rectangle(r) => {
                let local = rotate([point[0] - r.center[0], point[1] - r.center[1]], -r.angle_deg);
                local[0].abs() <= r.widths[0] / 2.0 * (1.0 + TOL)
                    && local[1].abs() <= r.widths[1] / 2.0 * (1.0 + TOL)
            }
            Shape::Circle(c) => {
                (point[0] - c.center[0]).hypot(point[1] - c.center[1]) <= c.radius * (1.0 + TOL)
            }
            Shape::Ellipse(e) => {
                let local = rotate([point[0] - e.center[0], point[1] - e.center[1]], -e.angle_deg);
                let u = local[0] / e.half_widths[0];
                let v = local[1] / e.half_widths[1];
                u * u + v * v <= 1.0 + TOL
            }
            Shape::Polygon(p) => point_in_polygon(point, &p.absolute_vertices(), TOL),
        }
    }

    /// Points on the boundary, used for enclosure tests.
    pub fn boundary_points(&self) -> Vec<[f64; 2]> {
        let ring = |f: &dyn Fn(f64) -> [f64; 2]| {
            (0..BOUNDARY_SAMPLES)
                .map(|k| f(2.0 * std::f64::consts::PI * k as f64 / BOUNDARY_SAMPLES as f64))
                .collect::<Vec<_>>()
        };
        match self {
            Shape::Grating(g) => vec![
                [g.center - g.width / 2.0, 0.0],
                [g.center + g.width / 2.0, 0.0],
            ],
            Shape::Rectangle(r) => {
                let (hx, hy) = (r.widths[0] / 2.0, r.widths[1] / 2.0);
                [[-hx, -hy], [hx, -hy], [hx, hy], [-hx, hy]]
                    .iter()
                    .map(|&c| {
                        let p = rotate(c, r.angle_deg);
                        [p[0] + r.center[0], p[1] + r.center[1]]
                    })
                    .collect()
            }
            Shape::Circle(c) => ring(&|t: f64| {
                [c.center[0] + c.radius * t.cos(), c.center[1] + c.radius * t.sin()]
            }),
            Shape::Ellipse(e) => ring(&|t: f64| {
                let p = rotate([e.half_widths[0] * t.cos(), e.half_widths[1] * t.sin()], e.angle_deg);
                [p[0] + e.center[0], p[1] + e.center[1]]
            }),
            Shape::Polygon(p) => p.absolute_vertices(),
        }
    }

    /// Whether `other` lies entirely inside this shape (sampled on the
    /// boundary of `other`).
    pub fn encloses(&self, other: &Shape) -> bool {
        other.boundary_points().into_iter().all(|p| self.contains(p))
    }

    /// Area of the shape (length of the stripe for a grating).
    pub fn area(&self) -> f64 {
        match self {
            Shape::Grating(g) => g.width,
            Shape::Rectangle(r) => r.widths[0] * r.widths[1],
            Shape::Circle(c) => std::f64::consts::PI * c.radius * c.radius,
            Shape::Ellipse(e) => std::f64::consts::PI * e.half_widths[0] * e.half_widths[1],
            Shape::Polygon(p) => polygon_signed_area(&p.absolute_vertices()).abs(),
        }
    }

    /// Copy with every length multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Shape {
        let s2 = |p: [f64; 2]| [p[0] * factor, p[1] * factor];
        match self {
            Shape::Grating(g) => Shape::Grating(Grating {
                center: g.center * factor,
                width: g.width * factor,
            }),
            Shape::Rectangle(r) => Shape::Rectangle(Rectangle {
                center: s2(r.center),
                widths: s2(r.widths),
                angle_deg: r.angle_deg,
            }),
            Shape::Circle(c) => Shape::Circle(Circle {
                center: s2(c.center),
                radius: c.radius * factor,
            }),
            Shape::Ellipse(e) => Shape::Ellipse(Ellipse {
                center: s2(e.center),
                half_widths: s2(e.half_widths),
                angle_deg: e.angle_deg,
            }),
            Shape::Polygon(p) => Shape::Polygon(Polygon {
                center: s2(p.center),
                angle_deg: p.angle_deg,
                vertices: p.vertices.iter().map(|&v| s2(v)).collect(),
            }),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Grating(_) => "grating",
            Shape::Rectangle(_) => "rectangle",
            Shape::Circle(_) => "circle",
            Shape::Ellipse(_) => "ellipse",
            Shape::Polygon(_) => "polygon",
        }
    }
}

impl Polygon {
    /// Vertices in cell coordinates.
    pub fn absolute_vertices(&self) -> Vec<[f64; 2]> {
        self.vertices
            .iter()
            .map(|&v| {
                let p = rotate(v, self.angle_deg);
                [p[0] + self.center[0], p[1] + self.center[1]]
            })
            .collect()
    }
}

/// Shoelace area, positive for counter-clockwise vertices.
pub fn polygon_signed_area(vertices: &[[f64; 2]]) -> f64 {
    let n = vertices.len();
    (0..n)
        .map(|k| {
            let a = vertices[k];
            let b = vertices[(k + 1) % n];
            a[0] * b[1] - b[0] * a[1]
        })
        .sum::<f64>()
        / 2.0
}

fn point_in_polygon(p: [f64; 2], vertices: &[[f64; 2]], tol: f64) -> bool {
    let n = vertices.len();
    let mut inside = false;
    for k in 0..n {
        let a = vertices[k];
        let b = vertices[(k + 1) % n];
        // On-edge points count as inside.
        let cross = (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
        let len = (b[0] - a[0]).hypot(b[1] - a[1]);
        let within = (p[0] - a[0]) * (p[0] - b[0]) + (p[1] - a[1]) * (p[1] - b[1]) <= 0.0;
        if cross.abs() <= tol * len.max(1.0) * len.max(1.0) && within {
            return true;
        }
        if (a[1] > p[1]) != (b[1] > p[1]) {
            let x = a[0] + (p[1] - a[1]) * (b[0] - a[0]) / (b[1] - a[1]);
            if p[0] < x {
                inside = !inside;
            }
        }
    }
    inside
}

impl Pattern {
    /// Build a pattern, choosing its parent among `existing`.
    ///
    /// With `parent == None` the latest existing pattern that encloses the
    /// new shape becomes the parent (or the background if none does). An
    /// explicit parent must index an earlier pattern that encloses the shape.
    pub fn nested_in(
        shape: Shape,
        material: usize,
        parent: Option<usize>,
        existing: &[Pattern],
    ) -> Result<Self, GeometryError> {
        shape.validate()?;
        let parent = match parent {
            Some(idx) => {
                let host = existing.get(idx).ok_or_else(|| {
                    GeometryError::OutOfRange(format!(
                        "parent index {idx} does not refer to an earlier pattern ({} exist)",
                        existing.len()
                    ))
                })?;
                if !host.shape.encloses(&shape) {
                    return Err(GeometryError::InvalidPattern(format!(
                        "{} is not enclosed by its parent {} (index {idx})",
                        shape.kind_name(),
                        host.shape.kind_name()
                    )));
                }
                Some(idx)
            }
            None => existing.iter().rposition(|p| p.shape.encloses(&shape)),
        };
        Ok(Self {
            shape,
            material,
            parent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn circle(cx: f64, cy: f64, r: f64) -> Shape {
        Shape::Circle(Circle {
            center: [cx, cy],
            radius: r,
        })
    }

    #[test]
    fn test_rotated_rectangle_contains() {
        let r = Shape::Rectangle(Rectangle {
            center: [0.0, 0.0],
            widths: [2.0, 0.2],
            angle_deg: 90.0,
        });
        assert!(r.contains([0.0, 0.9]));
        assert!(!r.contains([0.9, 0.0]));
    }

    #[test]
    fn test_polygon_contains_and_area() {
        let p = Shape::Polygon(Polygon {
            center: [1.0, 1.0],
            angle_deg: 0.0,
            vertices: vec![[-0.5, -0.5], [0.5, -0.5], [0.5, 0.5], [-0.5, 0.5]],
        });
        assert!(p.contains([1.2, 0.8]));
        assert!(p.contains([1.5, 1.0]));
        assert!(!p.contains([0.2, 1.0]));
        assert_relative_eq!(p.area(), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_polygon_needs_three_vertices() {
        let p = Shape::Polygon(Polygon {
            center: [0.0, 0.0],
            angle_deg: 0.0,
            vertices: vec![[0.0, 0.0], [1.0, 0.0]],
        });
        assert!(matches!(p.validate(), Err(GeometryError::OutOfRange(_))));
    }

    #[test]
    fn test_auto_parent_picks_latest_enclosing() {
        let mut patterns = Vec::new();
        patterns.push(Pattern::nested_in(circle(0.0, 0.0, 0.4), 1, None, &patterns).unwrap());
        patterns.push(Pattern::nested_in(circle(0.0, 0.0, 0.2), 2, None, &patterns).unwrap());
        patterns.push(Pattern::nested_in(circle(0.05, 0.0, 0.1), 3, None, &patterns).unwrap());
        patterns.push(Pattern::nested_in(circle(0.3, 0.3, 0.05), 1, None, &patterns).unwrap());
        assert_eq!(patterns[0].parent, None);
        assert_eq!(patterns[1].parent, Some(0));
        assert_eq!(patterns[2].parent, Some(1));
        // Outside the largest circle: embedded in the background.
        assert_eq!(patterns[3].parent, None);
    }

    #[test]
    fn test_explicit_parent_validated() {
        let outer = Pattern::nested_in(circle(0.0, 0.0, 0.4), 1, None, &[]).unwrap();
        let existing = vec![outer];
        assert!(matches!(
            Pattern::nested_in(circle(0.0, 0.0, 0.1), 2, Some(3), &existing),
            Err(GeometryError::OutOfRange(_))
        ));
        assert!(matches!(
            Pattern::nested_in(circle(0.6, 0.0, 0.1), 2, Some(0), &existing),
            Err(GeometryError::InvalidPattern(_))
        ));
        let inner = Pattern::nested_in(circle(0.0, 0.0, 0.1), 2, Some(0), &existing).unwrap();
        assert_eq!(inner.parent, Some(0));
    }

    #[test]
    fn test_scaled_shape() {
        let e = Shape::Ellipse(Ellipse {
            center: [1e-6, 0.0],
            half_widths: [2e-7, 1e-7],
            angle_deg: 30.0,
        })
        .scaled(1e6);
        match e {
            Shape::Ellipse(e) => {
                assert_relative_eq!(e.center[0], 1.0, epsilon = 1e-12);
                assert_relative_eq!(e.half_widths[0], 0.2, epsilon = 1e-12);
                assert_relative_eq!(e.angle_deg, 30.0);
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }
}
